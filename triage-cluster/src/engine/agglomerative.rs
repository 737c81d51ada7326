//! Complete-linkage agglomerative clustering
//!
//! Used for small batches where the full pairwise distance matrix is cheap.
//! Every segment ends up in some cluster; this path produces no noise.

use crate::engine::vector::cosine_distance;

/// Merge segments into clusters until no pair of clusters sits within
/// `distance_threshold` under complete linkage.
///
/// Complete linkage: the distance between two clusters is the maximum
/// pairwise distance across their members, so a merge only happens when
/// every member of one cluster is close to every member of the other.
///
/// Returns member indices into `embeddings`.
pub fn cluster(embeddings: &[Vec<f32>], distance_threshold: f32) -> Vec<Vec<usize>> {
    let n = embeddings.len();
    if n == 0 {
        return Vec::new();
    }

    // Full pairwise cosine-distance matrix
    let mut matrix = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = cosine_distance(&embeddings[i], &embeddings[j]);
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
    }

    // Every segment starts as its own cluster
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    loop {
        let mut best: Option<(usize, usize, f32)> = None;

        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let linkage = complete_linkage(&clusters[a], &clusters[b], &matrix);
                if linkage < distance_threshold
                    && best.map(|(_, _, d)| linkage < d).unwrap_or(true)
                {
                    best = Some((a, b, linkage));
                }
            }
        }

        match best {
            Some((a, b, _)) => {
                let merged = clusters.swap_remove(b);
                clusters[a].extend(merged);
            }
            None => break,
        }
    }

    clusters
}

fn complete_linkage(a: &[usize], b: &[usize], matrix: &[Vec<f32>]) -> f32 {
    let mut max = 0.0f32;
    for &i in a {
        for &j in b {
            max = max.max(matrix[i][j]);
        }
    }
    max
}
