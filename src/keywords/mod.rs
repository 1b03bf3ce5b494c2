#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::LazyLock;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Query words shorter than this are never keywords.
const MIN_KEYWORD_CHARS: usize = 3;
/// Language detection samples at most this many words.
const DETECTION_SAMPLE_WORDS: usize = 200;

/// English stop words, including the short forms the length filter would
/// catch anyway; language detection counts those too.
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "could", "did", "do", "does",
    "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in", "into", "is",
    "it", "its", "just", "nor", "not", "of", "off", "on", "only", "or", "our", "out", "over",
    "she", "should", "so", "than", "that", "the", "their", "them", "then", "these", "they",
    "this", "those", "to", "too", "under", "was", "we", "were", "what", "when", "where", "which",
    "who", "whom", "why", "will", "with", "would", "you", "your",
];

/// Spanish stop words, short forms included for the same reason.
const SPANISH_STOP_WORDS: &[&str] = &[
    "a", "al", "como", "cómo", "con", "cual", "cuál", "cuales", "cuáles", "cuando", "cuándo",
    "de", "del", "desde", "donde", "dónde", "el", "ella", "ellos", "en", "entre", "era", "es",
    "esa", "esas", "ese", "esos", "esta", "está", "estas", "están", "este", "estos", "fue",
    "hasta", "hay", "la", "las", "le", "lo", "los", "más", "muy", "no", "o", "para", "pero",
    "por", "porque", "que", "qué", "quien", "quién", "se", "ser", "si", "sí", "sin", "sobre",
    "son", "su", "sus", "también", "un", "una", "unas", "uno", "unos", "y", "ya",
];

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    ENGLISH_STOP_WORDS
        .iter()
        .chain(SPANISH_STOP_WORDS)
        .copied()
        .collect()
});

static ENGLISH_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ENGLISH_STOP_WORDS.iter().copied().collect());

static SPANISH_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| SPANISH_STOP_WORDS.iter().copied().collect());

/// Detected text language, used to pick the answer-language instruction
/// and to tag chunks for language filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryLanguage {
    English,
    Spanish,
    Unknown,
}

impl QueryLanguage {
    /// Two-letter tag for filter matching, when the language is known.
    #[inline]
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::English => Some("en"),
            Self::Spanish => Some("es"),
            Self::Unknown => None,
        }
    }
}

/// Turn a free-text query into lexical match keys: every meaningful word,
/// plus each adjacent pair of meaningful words as a two-word phrase. Word
/// segmentation is Unicode-aware, so accented Spanish text splits
/// correctly.
#[inline]
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered
        .unicode_words()
        .filter(|word| word.chars().count() >= MIN_KEYWORD_CHARS && !STOP_WORDS.contains(word))
        .collect();

    let pairs: Vec<String> = words
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect();

    words
        .into_iter()
        .map(str::to_string)
        .chain(pairs)
        .unique()
        .collect()
}

/// Classify text as English or Spanish by counting stop-word hits over a
/// bounded word sample; accented vocabulary counts as extra Spanish
/// evidence. Ties and stop-word-free text come back as `Unknown`.
#[inline]
pub fn detect_language(text: &str) -> QueryLanguage {
    let lowered = text.to_lowercase();
    let mut english = 0usize;
    let mut spanish = 0usize;

    for word in lowered.unicode_words().take(DETECTION_SAMPLE_WORDS) {
        if ENGLISH_SET.contains(word) {
            english += 1;
        }
        if SPANISH_SET.contains(word) {
            spanish += 1;
        }
        if word
            .chars()
            .any(|c| matches!(c, 'á' | 'é' | 'í' | 'ó' | 'ú' | 'ü' | 'ñ'))
        {
            spanish += 1;
        }
    }

    match (english.cmp(&spanish), english + spanish) {
        (_, 0) => QueryLanguage::Unknown,
        (std::cmp::Ordering::Greater, _) => QueryLanguage::English,
        (std::cmp::Ordering::Less, _) => QueryLanguage::Spanish,
        (std::cmp::Ordering::Equal, _) => QueryLanguage::Unknown,
    }
}
