#[cfg(test)]
mod tests;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::mmr::{MmrCandidate, mmr_rerank};
use super::similarity::cosine_similarity;
use super::{IndexEntry, SearchFilter, SearchHit, VectorIndex};
use crate::Result;

/// In-memory reference backend: an exact cosine scan with native filter
/// support. Small deployments and the test suite run against this; larger
/// ones bring their own [`VectorIndex`] implementation.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl MemoryIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    #[inline]
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let entries = self.entries.read().await;
        let mut hits: Vec<SearchHit> = entries
            .iter()
            .filter(|entry| filter.matches(&entry.chunk))
            .map(|entry| SearchHit {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();
        drop(entries);

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        debug!("Vector search returned {} of {} requested hits", hits.len(), k);
        Ok(hits)
    }

    #[inline]
    async fn search_mmr(
        &self,
        query: &[f32],
        k: usize,
        fetch_k: usize,
        lambda: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        let entries = self.entries.read().await;
        let mut candidates: Vec<MmrCandidate<SearchHit>> = entries
            .iter()
            .filter(|entry| filter.matches(&entry.chunk))
            .map(|entry| {
                let score = cosine_similarity(query, &entry.vector);
                MmrCandidate {
                    item: SearchHit {
                        chunk: entry.chunk.clone(),
                        score,
                    },
                    score,
                    vector: entry.vector.clone(),
                }
            })
            .collect();
        drop(entries);

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(fetch_k.max(k));

        Ok(mmr_rerank(query, candidates, k, lambda)
            .into_iter()
            .map(|candidate| candidate.item)
            .collect())
    }

    #[inline]
    async fn search_keywords(
        &self,
        keywords: &[String],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut hits: Vec<SearchHit> = entries
            .iter()
            .filter(|entry| filter.matches(&entry.chunk))
            .filter_map(|entry| {
                let lowered = entry.chunk.text.to_lowercase();
                let matched = keywords
                    .iter()
                    .filter(|keyword| lowered.contains(keyword.as_str()))
                    .count();
                (matched > 0).then(|| SearchHit {
                    chunk: entry.chunk.clone(),
                    score: matched as f32 / keywords.len() as f32,
                })
            })
            .collect();
        drop(entries);

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    #[inline]
    async fn add_document(&self, source: &str, new_entries: Vec<IndexEntry>) -> Result<()> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.chunk.source != source);
        let replaced = before - entries.len();
        let added = new_entries.len();
        entries.extend(new_entries);

        if replaced > 0 {
            info!(
                "Re-indexed '{}': replaced {} chunks with {}",
                source, replaced, added
            );
        } else {
            info!("Indexed {} chunks for '{}'", added, source);
        }
        Ok(())
    }

    #[inline]
    async fn delete_document(&self, source: &str) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.chunk.source != source);
        let removed = (before - entries.len()) as u64;
        info!("Deleted {} chunks for '{}'", removed, source);
        Ok(removed)
    }
}
