
pub mod memory;
pub mod mmr;
pub mod similarity;

pub use memory::MemoryIndex;
pub use mmr::{MmrCandidate, mmr_rerank};
pub use similarity::{cosine_similarity, magnitude};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::ingest::DocumentChunk;

/// Backend-opaque retrieval constraints. Each backend translates this into
/// its native filter syntax; an empty filter matches everything. Source and
/// language constraints apply conjunctively when both are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Non-empty list restricts results to these document names.
    pub sources: Vec<String>,
    /// Restricts results to chunks tagged with this language.
    pub language: Option<String>,
}

impl SearchFilter {
    #[inline]
    pub fn is_unfiltered(&self) -> bool {
        self.sources.is_empty() && self.language.is_none()
    }

    /// Whether `chunk` satisfies every set constraint.
    #[inline]
    pub fn matches(&self, chunk: &DocumentChunk) -> bool {
        let source_ok =
            self.sources.is_empty() || self.sources.iter().any(|source| source == &chunk.source);
        let language_ok = self
            .language
            .as_deref()
            .is_none_or(|language| chunk.language.as_deref() == Some(language));
        source_ok && language_ok
    }
}

/// A chunk stored alongside its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// A retrieval candidate with its raw similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Vector store surface the orchestrator retrieves through. Backends own
/// persistence and query mechanics; the orchestrator only builds filters
/// and consumes hits.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest-neighbor search over stored vectors, best score first.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>>;

    /// Diversity-aware search: fetch `fetch_k` candidates, then reduce to
    /// `k` with maximal marginal relevance at the given `lambda`.
    async fn search_mmr(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>>;

    /// Lexical search scoring candidates by keyword overlap.
    async fn search_keywords(
        &self,
        keywords: &[String],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>>;

    /// Index a document's chunks, replacing any chunks previously stored
    /// under `source`.
    async fn add_document(&self, source: &str, entries: Vec<IndexEntry>) -> Result<()>;

    /// Remove every chunk indexed under `source`, returning how many were
    /// removed.
    async fn delete_document(&self, source: &str) -> Result<u64>;
}
