use super::similarity::cosine_similarity;

/// A candidate for diversity re-ranking, carrying its payload, its raw
/// relevance score, and the embedding the redundancy term is computed from.
#[derive(Debug, Clone)]
pub struct MmrCandidate<T> {
    pub item: T,
    pub score: f32,
    pub vector: Vec<f32>,
}

/// Maximal marginal relevance re-ranking:
/// `lambda * relevance - (1 - lambda) * max similarity to the selected set`.
/// `lambda` 1.0 is pure relevance, 0.0 pure diversity. Candidates should
/// arrive sorted by relevance so ties resolve toward the better raw score.
#[inline]
pub fn mmr_rerank<T>(
    query: &[f32],
    mut remaining: Vec<MmrCandidate<T>>,
    k: usize,
    lambda: f32,
) -> Vec<MmrCandidate<T>> {
    let lambda = lambda.clamp(0.0, 1.0);
    let k = k.min(remaining.len());
    let mut selected: Vec<MmrCandidate<T>> = Vec::with_capacity(k);

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0usize;
        let mut best_score = f32::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let relevance = cosine_similarity(query, &candidate.vector);
            let redundancy = selected
                .iter()
                .map(|chosen| cosine_similarity(&candidate.vector, &chosen.vector))
                .fold(0.0f32, f32::max);
            let score = lambda.mul_add(relevance, -((1.0 - lambda) * redundancy));
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected
}
