//! Vector distance and exhaustive nearest-neighbour ranking.

/// Squared Euclidean distance between two vectors of equal length.
///
/// Vectors of different length are never compared by the store; if it
/// happens anyway the extra components are ignored.
pub fn squared_l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Rank `vectors` by squared L2 distance to `query` and keep the best `k`.
///
/// Returns `(row, distance)` pairs, nearest first. Equal distances keep
/// row order, so older rows win ties.
pub fn nearest_neighbours(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(row, v)| (row, squared_l2_distance(v, query)))
        .collect();

    // `sort_by` is stable.
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
    scored.truncate(k);
    scored
}
