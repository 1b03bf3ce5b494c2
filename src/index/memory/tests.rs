use chrono::Utc;
use uuid::Uuid;

use super::*;
use crate::ingest::{ContentType, DocumentChunk};
use crate::pages::PageExtraction;

fn make_entry(source: &str, text: &str, language: Option<&str>, vector: Vec<f32>) -> IndexEntry {
    IndexEntry {
        chunk: DocumentChunk {
            id: Uuid::new_v4(),
            source: source.to_string(),
            text: text.to_string(),
            token_count: text.split_whitespace().count(),
            chunk_index: 0,
            total_chunks: 1,
            start_offset: 0,
            end_offset: text.len(),
            page: 1,
            extraction: PageExtraction::PageBlocksDominant,
            image_ref: None,
            content_type: ContentType::Text,
            language: language.map(str::to_string),
            created_at: Utc::now(),
        },
        vector,
    }
}

#[tokio::test]
async fn search_orders_by_cosine_similarity() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            vec![
                make_entry("doc.pdf", "aligned", None, vec![1.0, 0.0]),
                make_entry("doc.pdf", "orthogonal", None, vec![0.0, 1.0]),
                make_entry("doc.pdf", "diagonal", None, vec![0.7, 0.7]),
            ],
        )
        .await
        .expect("can index");

    let hits = index
        .search(&[1.0, 0.0], 3, &SearchFilter::default())
        .await
        .expect("can search");

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].chunk.text, "aligned");
    assert_eq!(hits[1].chunk.text, "diagonal");
    assert_eq!(hits[2].chunk.text, "orthogonal");
    assert!(hits[0].score > hits[1].score);
    assert!(hits[1].score > hits[2].score);
}

#[tokio::test]
async fn search_respects_k() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            (0..10)
                .map(|i| make_entry("doc.pdf", &format!("chunk {}", i), None, vec![1.0, i as f32]))
                .collect(),
        )
        .await
        .expect("can index");

    let hits = index
        .search(&[1.0, 0.0], 4, &SearchFilter::default())
        .await
        .expect("can search");

    assert_eq!(hits.len(), 4);
}

#[tokio::test]
async fn source_filter_never_leaks_other_documents() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc_A.pdf",
            vec![make_entry("doc_A.pdf", "from A", None, vec![0.1, 0.9])],
        )
        .await
        .expect("can index");
    index
        .add_document(
            "doc_B.pdf",
            vec![make_entry("doc_B.pdf", "from B", None, vec![1.0, 0.0])],
        )
        .await
        .expect("can index");

    let filter = SearchFilter {
        sources: vec!["doc_A.pdf".to_string()],
        language: None,
    };
    // doc_B scores far higher against this query, and still must not appear.
    let hits = index.search(&[1.0, 0.0], 10, &filter).await.expect("can search");

    assert_eq!(hits.len(), 1);
    assert!(hits.iter().all(|hit| hit.chunk.source == "doc_A.pdf"));
}

#[tokio::test]
async fn language_and_source_filters_combine() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            vec![
                make_entry("doc.pdf", "english chunk", Some("en"), vec![1.0, 0.0]),
                make_entry("doc.pdf", "spanish chunk", Some("es"), vec![1.0, 0.0]),
            ],
        )
        .await
        .expect("can index");

    let filter = SearchFilter {
        sources: vec!["doc.pdf".to_string()],
        language: Some("es".to_string()),
    };
    let hits = index.search(&[1.0, 0.0], 10, &filter).await.expect("can search");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.text, "spanish chunk");
}

#[tokio::test]
async fn reingesting_replaces_previous_chunks() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            vec![
                make_entry("doc.pdf", "old one", None, vec![1.0, 0.0]),
                make_entry("doc.pdf", "old two", None, vec![0.0, 1.0]),
            ],
        )
        .await
        .expect("can index");

    index
        .add_document(
            "doc.pdf",
            vec![make_entry("doc.pdf", "new", None, vec![1.0, 0.0])],
        )
        .await
        .expect("can re-index");

    assert_eq!(index.len().await, 1);
    let hits = index
        .search(&[1.0, 0.0], 10, &SearchFilter::default())
        .await
        .expect("can search");
    assert_eq!(hits[0].chunk.text, "new");
}

#[tokio::test]
async fn delete_document_reports_removed_count() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            vec![
                make_entry("doc.pdf", "one", None, vec![1.0]),
                make_entry("doc.pdf", "two", None, vec![1.0]),
            ],
        )
        .await
        .expect("can index");

    let removed = index.delete_document("doc.pdf").await.expect("can delete");

    assert_eq!(removed, 2);
    assert!(index.is_empty().await);
    assert_eq!(index.delete_document("doc.pdf").await.expect("can delete"), 0);
}

#[tokio::test]
async fn keyword_search_scores_by_match_fraction() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            vec![
                make_entry("doc.pdf", "degassing procedure for the bag", None, vec![1.0]),
                make_entry("doc.pdf", "only the procedure is covered", None, vec![1.0]),
                make_entry("doc.pdf", "nothing relevant at all", None, vec![1.0]),
            ],
        )
        .await
        .expect("can index");

    let keywords = vec!["degassing".to_string(), "procedure".to_string()];
    let hits = index
        .search_keywords(&keywords, 10, &SearchFilter::default())
        .await
        .expect("can search");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.text, "degassing procedure for the bag");
    assert!((hits[0].score - 1.0).abs() < f32::EPSILON);
    assert!((hits[1].score - 0.5).abs() < f32::EPSILON);
}

#[tokio::test]
async fn empty_keyword_list_returns_nothing() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            vec![make_entry("doc.pdf", "anything", None, vec![1.0])],
        )
        .await
        .expect("can index");

    let hits = index
        .search_keywords(&[], 10, &SearchFilter::default())
        .await
        .expect("can search");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn mmr_prefers_diverse_results_over_near_duplicates() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            vec![
                make_entry("doc.pdf", "best match", None, vec![0.99, 0.01, 0.0]),
                make_entry("doc.pdf", "near duplicate", None, vec![0.98, 0.02, 0.0]),
                make_entry("doc.pdf", "different topic", None, vec![0.0, 0.0, 1.0]),
            ],
        )
        .await
        .expect("can index");

    let hits = index
        .search_mmr(&[1.0, 0.0, 0.0], 2, 3, 0.5, &SearchFilter::default())
        .await
        .expect("can search");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.text, "best match");
    assert_eq!(hits[1].chunk.text, "different topic");
}

#[tokio::test]
async fn mmr_with_pure_relevance_preserves_similarity_order() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            vec![
                make_entry("doc.pdf", "first", None, vec![0.99, 0.01, 0.0]),
                make_entry("doc.pdf", "second", None, vec![0.98, 0.02, 0.0]),
                make_entry("doc.pdf", "third", None, vec![0.0, 0.0, 1.0]),
            ],
        )
        .await
        .expect("can index");

    let hits = index
        .search_mmr(&[1.0, 0.0, 0.0], 2, 3, 1.0, &SearchFilter::default())
        .await
        .expect("can search");

    assert_eq!(hits[0].chunk.text, "first");
    assert_eq!(hits[1].chunk.text, "second");
}

#[tokio::test]
async fn mmr_fetch_k_bounds_the_candidate_pool() {
    let index = MemoryIndex::new();
    index
        .add_document(
            "doc.pdf",
            vec![
                make_entry("doc.pdf", "close", None, vec![0.99, 0.01, 0.0]),
                make_entry("doc.pdf", "closer", None, vec![1.0, 0.0, 0.0]),
                make_entry("doc.pdf", "far but diverse", None, vec![0.0, 0.0, 1.0]),
            ],
        )
        .await
        .expect("can index");

    // With the pool clamped to the two best candidates, the diverse vector
    // can never be selected, whatever lambda says.
    let hits = index
        .search_mmr(&[1.0, 0.0, 0.0], 2, 2, 0.0, &SearchFilter::default())
        .await
        .expect("can search");

    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|hit| hit.chunk.text != "far but diverse"));
}
