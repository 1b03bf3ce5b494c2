
use std::sync::LazyLock;

use fancy_regex::Regex;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::SearchHit;
use crate::ingest::ContentType;
use crate::keywords::extract_keywords;

/// Default display cap for snippets; ranking always sees the full text.
pub const DEFAULT_SNIPPET_LEN: usize = 300;

static PAGE_MARKER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*--- Page \d+ ---\s*").expect("page marker pattern is valid")
});

/// A ranked, display-ready reference to a retrieved chunk. Computed fresh
/// for every query and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based rank position.
    pub id: usize,
    pub source: String,
    pub page: u32,
    pub snippet: String,
    /// Raw backend similarity.
    pub similarity_score: f32,
    /// Rank-normalized display score in `[0, 100]`, comparable across
    /// queries whose raw scores live on very different scales.
    pub similarity_percentage: f32,
    pub content_type: ContentType,
}

/// Filter, re-sort, and number retrieval candidates into a citation list.
///
/// Candidates with zero keyword overlap against the query are dropped; a
/// single hit is enough to stay, since semantic similarity is the primary
/// relevance signal and keyword overlap only a sanity check. Survivors are
/// ordered by raw similarity.
#[inline]
pub fn rank_citations(query: &str, hits: &[SearchHit], snippet_len: usize) -> Vec<Citation> {
    let keywords = extract_keywords(query);

    let mut survivors: Vec<&SearchHit> = hits
        .iter()
        .filter(|hit| keywords.is_empty() || keyword_matches(&hit.chunk.text, &keywords) > 0)
        .collect();

    if survivors.len() < hits.len() {
        debug!(
            "Dropped {} of {} candidates with no keyword overlap",
            hits.len() - survivors.len(),
            hits.len()
        );
    }

    survivors.sort_by(|a, b| b.score.total_cmp(&a.score));

    let count = survivors.len();
    survivors
        .iter()
        .enumerate()
        .map(|(rank, hit)| Citation {
            id: rank + 1,
            source: hit.chunk.source.clone(),
            page: hit.chunk.page,
            snippet: clean_snippet(&hit.chunk.text, snippet_len),
            similarity_score: hit.score,
            similarity_percentage: rank_percentage(rank, count),
            content_type: hit.chunk.content_type,
        })
        .collect()
}

/// Display percentage for the candidate at `rank` (0-based) among `count`
/// survivors: monotonic with rank, top candidate highest, bounded to
/// `[0, 100]`, and identical inputs always produce identical values.
#[inline]
pub fn rank_percentage(rank: usize, count: usize) -> f32 {
    if count == 0 {
        return 0.0;
    }
    (100.0 * (count - rank) as f32 / count as f32).clamp(0.0, 100.0)
}

/// How many of the query keywords appear in `text`, case-insensitively.
fn keyword_matches(text: &str, keywords: &[String]) -> usize {
    let lowered = text.to_lowercase();
    keywords
        .iter()
        .filter(|keyword| lowered.contains(keyword.as_str()))
        .count()
}

/// Strip page markers, collapse whitespace, and cap length for display.
#[inline]
pub fn clean_snippet(text: &str, max_len: usize) -> String {
    let stripped = PAGE_MARKER_LINE.replace_all(text, " ");
    let collapsed = stripped.split_whitespace().join(" ");

    if collapsed.chars().count() <= max_len {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(max_len).collect();
        format!("{}...", cut.trim_end())
    }
}
