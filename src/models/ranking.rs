//! Top-K ranking of class probability vectors

use ndarray::ArrayView1;

/// Class indices ordered by descending probability.
///
/// The sort is stable, so equal probabilities keep ascending index order.
pub fn rank_descending(probabilities: ArrayView1<'_, f32>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..probabilities.len()).collect();
    indices.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));
    indices
}

/// The `k` most probable `(class index, probability)` pairs, descending.
/// Returns every class when there are fewer than `k`.
pub fn top_k(probabilities: ArrayView1<'_, f32>, k: usize) -> Vec<(usize, f32)> {
    rank_descending(probabilities)
        .into_iter()
        .take(k)
        .map(|index| (index, probabilities[index]))
        .collect()
}
