/// Euclidean norm of a vector.
#[inline]
pub fn magnitude(vector: &[f32]) -> f32 {
    vector
        .iter()
        .fold(0.0f32, |acc, v| v.mul_add(*v, acc))
        .sqrt()
}

/// Cosine similarity in `[-1, 1]`. Mismatched or zero-magnitude inputs
/// score 0 rather than poisoning rankings with NaN.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot = a
        .iter()
        .zip(b)
        .fold(0.0f32, |acc, (x, y)| x.mul_add(*y, acc));
    let denom = magnitude(a) * magnitude(b);
    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}
