//! Embedding-vector math for the cluster engine
//!
//! All distances are cosine distances (1 - cosine similarity): 0 means
//! identical direction, 2 means opposite.

/// Cosine distance between two vectors.
///
/// Zero-magnitude vectors have no direction; they are treated as maximally
/// far from everything (distance 1.0) rather than producing NaN.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    (1.0 - similarity.clamp(-1.0, 1.0)) as f32
}

/// Element-wise mean of a set of vectors.
///
/// Returns an empty vector for empty input.
pub fn centroid(vectors: &[&[f32]]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };

    let mut sums = vec![0.0f64; first.len()];
    for vector in vectors {
        for (sum, value) in sums.iter_mut().zip(vector.iter()) {
            *sum += *value as f64;
        }
    }

    let count = vectors.len() as f64;
    sums.into_iter().map(|s| (s / count) as f32).collect()
}

/// Nearest-rank percentile of a set of values (`pct` in 0..=100).
///
/// Returns 0.0 for empty input.
pub fn percentile(values: &[f32], pct: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance_identical_direction() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![2.0, 4.0, 6.0];
        assert!(cosine_distance(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_distance(&a, &b), 1.0);
    }

    #[test]
    fn test_centroid_mean() {
        let a = vec![1.0, 0.0];
        let b = vec![3.0, 2.0];
        let c = centroid(&[&a, &b]);
        assert_eq!(c, vec![2.0, 1.0]);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        assert_eq!(percentile(&values, 95.0), 1.0);
        assert_eq!(percentile(&values, 50.0), 0.5);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }
}
