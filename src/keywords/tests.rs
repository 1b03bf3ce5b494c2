use super::*;

#[test]
fn spanish_stop_words_are_removed() {
    let keywords = extract_keywords("¿Cuál es el procedimiento de degasado de la bolsa?");

    assert!(keywords.contains(&"procedimiento".to_string()));
    assert!(keywords.contains(&"degasado".to_string()));
    assert!(keywords.contains(&"bolsa".to_string()));
    assert!(!keywords.contains(&"el".to_string()));
    assert!(!keywords.contains(&"de".to_string()));
    assert!(!keywords.contains(&"la".to_string()));
    assert!(!keywords.contains(&"cuál".to_string()));
}

#[test]
fn english_stop_words_are_removed() {
    let keywords = extract_keywords("What is the email address?");

    assert!(keywords.contains(&"email".to_string()));
    assert!(keywords.contains(&"address".to_string()));
    assert!(!keywords.contains(&"what".to_string()));
    assert!(!keywords.contains(&"the".to_string()));
}

#[test]
fn adjacent_pairs_become_phrase_keys() {
    let keywords = extract_keywords("the quick brown fox");

    assert!(keywords.contains(&"quick".to_string()));
    assert!(keywords.contains(&"brown".to_string()));
    assert!(keywords.contains(&"fox".to_string()));
    assert!(keywords.contains(&"quick brown".to_string()));
    assert!(keywords.contains(&"brown fox".to_string()));
    // "the" is a stop word, so no pair bridges it.
    assert!(!keywords.iter().any(|k| k.contains("the ")));
}

#[test]
fn pairs_are_built_after_filtering() {
    // "of" drops out, making "chain" and "custody" adjacent.
    let keywords = extract_keywords("chain of custody");

    assert!(keywords.contains(&"chain custody".to_string()));
}

#[test]
fn short_tokens_are_dropped() {
    let keywords = extract_keywords("go to it");
    assert!(keywords.is_empty());
}

#[test]
fn keywords_are_lowercased_and_unique() {
    let keywords = extract_keywords("Widget WIDGET widget");

    assert_eq!(keywords, vec!["widget".to_string(), "widget widget".to_string()]);
}

#[test]
fn accented_words_survive_segmentation() {
    let keywords = extract_keywords("configuración del análisis");

    assert!(keywords.contains(&"configuración".to_string()));
    assert!(keywords.contains(&"análisis".to_string()));
}

#[test]
fn detects_english() {
    let language = detect_language("What is the procedure for degassing the bag?");
    assert_eq!(language, QueryLanguage::English);
}

#[test]
fn detects_spanish() {
    let language = detect_language("¿Cuál es el procedimiento de degasado de la bolsa?");
    assert_eq!(language, QueryLanguage::Spanish);
}

#[test]
fn stop_word_free_text_is_unknown() {
    let language = detect_language("zxcv qwerty 12345");
    assert_eq!(language, QueryLanguage::Unknown);
}

#[test]
fn language_tags() {
    assert_eq!(QueryLanguage::English.tag(), Some("en"));
    assert_eq!(QueryLanguage::Spanish.tag(), Some("es"));
    assert_eq!(QueryLanguage::Unknown.tag(), None);
}
