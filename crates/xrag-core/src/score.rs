//! Distance/similarity transforms shared by retrieval, fusion and reranking.
//!
//! Stores report non-negative distances where smaller is better. Everything
//! downstream ranks by similarity where larger is better, using the monotonic
//! transform `1 / (1 + d)`. The inverse `(1 / s) - 1` is an approximation used
//! only to keep fused/hybrid output in the same distance-shaped schema; it is
//! not a calibrated probability and boosting math depends on its exact shape.

/// Pools whose score range is below this are treated as degenerate.
pub const DEGENERATE_RANGE: f32 = 1e-12;

/// Convert a store distance to a similarity in `(0, 1]`.
///
/// `None`, negative and non-finite distances map to `0.0`.
pub fn distance_to_similarity(distance: Option<f32>) -> f32 {
    match distance {
        Some(d) if d == 0.0 => 1.0,
        Some(d) if d.is_finite() && d > 0.0 => 1.0 / (1.0 + d),
        _ => 0.0,
    }
}

/// Approximate distance for a similarity-like score. `None` unless `score > 0`.
pub fn similarity_to_distance(score: f32) -> Option<f32> {
    if score > 0.0 && score.is_finite() {
        Some(1.0 / score - 1.0)
    } else {
        None
    }
}

/// In-place min-max normalization over the whole slice.
///
/// When `max - min` is below [`DEGENERATE_RANGE`] every value is left as is.
pub fn min_max_normalize(values: &mut [f32]) {
    let Some((min, max)) = min_max(values) else { return };
    let range = max - min;
    if range < DEGENERATE_RANGE {
        return;
    }
    for v in values.iter_mut() {
        *v = (*v - min) / range;
    }
}

fn min_max(values: &[f32]) -> Option<(f32, f32)> {
    let mut it = values.iter().copied();
    let first = it.next()?;
    Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

/// Cosine similarity of two vectors; `0.0` when either has zero norm or the
/// dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
