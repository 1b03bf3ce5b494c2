
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::citations::{Citation, DEFAULT_SNIPPET_LEN, rank_citations};
use crate::index::{SearchFilter, SearchHit, VectorIndex};
use crate::keywords::{QueryLanguage, detect_language, extract_keywords};
use crate::{RagError, Result};

/// How candidates are retrieved for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Semantic,
    Keyword,
    Hybrid,
}

/// Per-query retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub search_mode: SearchMode,
    /// Semantic share of the hybrid blend; the keyword share is the
    /// remainder.
    pub semantic_weight: f32,
    /// Final number of chunks handed to answer synthesis.
    pub top_k: usize,
    pub use_mmr: bool,
    /// Candidate pool size fetched ahead of MMR reduction or hybrid
    /// blending.
    pub fetch_k: usize,
    /// MMR balance: 1.0 pure relevance, 0.0 pure diversity.
    pub mmr_lambda: f32,
    /// Non-empty list strictly scopes retrieval to these document names.
    pub active_sources: Vec<String>,
    /// Restricts retrieval to chunks tagged with this language.
    pub filter_language: Option<String>,
    /// Display cap for citation snippets.
    pub snippet_len: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            search_mode: SearchMode::Semantic,
            semantic_weight: 0.7,
            top_k: 5,
            use_mmr: false,
            fetch_k: 20,
            mmr_lambda: 0.5,
            active_sources: Vec::new(),
            filter_language: None,
            snippet_len: DEFAULT_SNIPPET_LEN,
        }
    }
}

impl RetrievalConfig {
    /// Range checks for every field a caller can get wrong.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.semantic_weight) {
            return Err(RagError::Config(format!(
                "semantic_weight must be between 0.0 and 1.0, got {}",
                self.semantic_weight
            )));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(RagError::Config(format!(
                "mmr_lambda must be between 0.0 and 1.0, got {}",
                self.mmr_lambda
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".to_string()));
        }
        if self.fetch_k < self.top_k {
            return Err(RagError::Config(format!(
                "fetch_k ({}) must be at least top_k ({})",
                self.fetch_k, self.top_k
            )));
        }
        Ok(())
    }
}

/// Produces query embeddings. Implementations wrap whatever embedding
/// service the deployment uses.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub answer: String,
    pub usage: TokenUsage,
}

/// Generates an answer from assembled context. `language` selects the
/// answer-language instruction; prompt construction is the implementation's
/// concern.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        query: &str,
        context: &str,
        language: QueryLanguage,
    ) -> Result<SynthesizedAnswer>;
}

/// Everything one query/response cycle returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub usage: TokenUsage,
    pub language: QueryLanguage,
}

impl QueryResponse {
    fn error(message: &str, language: QueryLanguage) -> Self {
        Self {
            answer: format!("Error: {}", message),
            citations: Vec::new(),
            usage: TokenUsage::default(),
            language,
        }
    }
}

/// Composes embedding, vector search, diversity reduction, citation
/// ranking, and answer synthesis into one query pipeline.
pub struct RetrievalOrchestrator {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            embedder,
            index,
            synthesizer,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Answer a query end to end. Backend failures come back as a
    /// structured error response; this never bubbles an error into the
    /// serving loop.
    #[inline]
    pub async fn answer(&self, query: &str) -> QueryResponse {
        let language = detect_language(query);
        debug!("Answering query ({:?}): {}", language, query);

        let hits = match self.retrieve(query).await {
            Ok(hits) => hits,
            Err(e) => {
                error!("Retrieval failed: {}", e);
                return QueryResponse::error(&e.to_string(), language);
            }
        };

        let citations = rank_citations(query, &hits, self.config.snippet_len);
        let context = build_context(&hits);

        match self.synthesizer.synthesize(query, &context, language).await {
            Ok(synthesized) => {
                info!(
                    "Answered query with {} citations ({} prompt / {} completion tokens)",
                    citations.len(),
                    synthesized.usage.prompt_tokens,
                    synthesized.usage.completion_tokens
                );
                QueryResponse {
                    answer: synthesized.answer,
                    citations,
                    usage: synthesized.usage,
                    language,
                }
            }
            Err(e) => {
                error!("Answer synthesis failed: {}", e);
                QueryResponse::error(&e.to_string(), language)
            }
        }
    }

    /// Retrieval candidates for a query per the configured search mode.
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        let filter = SearchFilter {
            sources: self.config.active_sources.clone(),
            language: self.config.filter_language.clone(),
        };

        let mut hits = match self.config.search_mode {
            SearchMode::Semantic => {
                self.semantic_hits(query, self.config.top_k, &filter).await?
            }
            SearchMode::Keyword => self.keyword_hits(query, self.config.top_k, &filter).await?,
            SearchMode::Hybrid => self.hybrid_hits(query, &filter).await?,
        };

        // Source scoping is a correctness invariant, so it holds here even
        // against a backend that ignores the filter.
        if !self.config.active_sources.is_empty() {
            hits.retain(|hit| {
                self.config
                    .active_sources
                    .iter()
                    .any(|source| source == &hit.chunk.source)
            });
        }

        hits.truncate(self.config.top_k);
        Ok(hits)
    }

    async fn semantic_hits(
        &self,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let vector = self.embedder.embed_query(query).await?;
        if self.config.use_mmr {
            self.index
                .search_mmr(
                    &vector,
                    k,
                    self.config.fetch_k,
                    self.config.mmr_lambda,
                    filter,
                )
                .await
        } else {
            self.index.search(&vector, k, filter).await
        }
    }

    async fn keyword_hits(
        &self,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let keywords = extract_keywords(query);
        self.index.search_keywords(&keywords, k, filter).await
    }

    /// Fetch both result sets and blend scores: chunks found by both lanes
    /// get `semantic_weight * semantic + keyword_weight * keyword`; chunks
    /// found by one lane keep that lane's weighted score.
    async fn hybrid_hits(&self, query: &str, filter: &SearchFilter) -> Result<Vec<SearchHit>> {
        let pool = self.config.fetch_k.max(self.config.top_k);
        let semantic = self.semantic_hits(query, pool, filter).await?;
        let keyword = self.keyword_hits(query, pool, filter).await?;

        let semantic_weight = self.config.semantic_weight;
        let keyword_weight = 1.0 - semantic_weight;

        let mut keyword_scores: HashMap<Uuid, f32> = keyword
            .iter()
            .map(|hit| (hit.chunk.id, hit.score))
            .collect();

        let mut blended: Vec<SearchHit> = Vec::with_capacity(semantic.len() + keyword.len());
        for hit in semantic {
            let keyword_score = keyword_scores.remove(&hit.chunk.id).unwrap_or(0.0);
            blended.push(SearchHit {
                score: semantic_weight.mul_add(hit.score, keyword_weight * keyword_score),
                chunk: hit.chunk,
            });
        }
        for hit in keyword {
            if keyword_scores.contains_key(&hit.chunk.id) {
                blended.push(SearchHit {
                    score: keyword_weight * hit.score,
                    chunk: hit.chunk,
                });
            }
        }

        blended.sort_by(|a, b| b.score.total_cmp(&a.score));
        blended.truncate(self.config.top_k);
        Ok(blended)
    }
}

/// Assemble the context block handed to the synthesis client.
fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "[{} p.{}]\n{}",
                hit.chunk.source, hit.chunk.page, hit.chunk.text
            )
        })
        .join("\n\n")
}
