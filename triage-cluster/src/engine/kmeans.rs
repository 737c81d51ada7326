//! Iterative bisecting K-means clustering
//!
//! The scalable path: repeatedly K-means the remaining pool, finalize the
//! sub-clusters that pass the tightness test, and return the rest to the
//! pool. Whatever is left when the loop terminates is noise.

use crate::engine::vector::{centroid, cosine_distance, percentile};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use triage_common::PipelineParams;

/// Tightness test percentile. A sub-cluster is finalized when the 95th
/// percentile of member-to-centroid distances is below the threshold.
const TIGHTNESS_PCT: f64 = 95.0;

/// Lloyd iteration cap for one K-means invocation
const MAX_LLOYD_ROUNDS: usize = 25;

/// Outcome of the iterative loop: finalized member-index groups plus the
/// leftover pool (noise).
pub struct KmeansOutcome {
    pub finalized: Vec<Vec<usize>>,
    pub noise: Vec<usize>,
}

/// Estimated cluster count for a pool: `max(2, round(k * log10(pool)))`
pub fn estimate_k(pool_size: usize, k_multiplier: f64) -> usize {
    let estimated = (k_multiplier * (pool_size as f64).log10()).round() as i64;
    estimated.max(2) as usize
}

/// Run the iterative bisecting loop over all embeddings.
///
/// Termination: pool smaller than `min_cluster_size`, the iteration cap, or
/// an iteration that makes no progress (pool size unchanged).
pub fn cluster(embeddings: &[Vec<f32>], params: &PipelineParams) -> KmeansOutcome {
    let mut pool: Vec<usize> = (0..embeddings.len()).collect();
    let mut finalized: Vec<Vec<usize>> = Vec::new();

    for iteration in 0..params.max_kmeans_iterations {
        // Floor of 1 keeps an empty pool from reaching the seeding step
        if pool.len() < params.min_cluster_size.max(1) {
            break;
        }

        let k = estimate_k(pool.len(), params.k_multiplier).min(pool.len());
        let assignments = lloyd(embeddings, &pool, k, iteration as u64);

        let mut next_pool: Vec<usize> = Vec::new();
        let mut finalized_this_round = 0usize;

        for members in assignments {
            if members.is_empty() {
                continue;
            }

            let vectors: Vec<&[f32]> =
                members.iter().map(|&i| embeddings[i].as_slice()).collect();
            let center = centroid(&vectors);
            let distances: Vec<f32> = members
                .iter()
                .map(|&i| cosine_distance(&embeddings[i], &center))
                .collect();
            let tightness = percentile(&distances, TIGHTNESS_PCT);

            if tightness < params.distance_threshold {
                finalized.push(members);
                finalized_this_round += 1;
            } else {
                next_pool.extend(members);
            }
        }

        tracing::debug!(
            iteration,
            pool = pool.len(),
            remaining = next_pool.len(),
            finalized = finalized_this_round,
            "Bisecting K-means iteration"
        );

        // No progress: every sub-cluster failed the tightness test
        if next_pool.len() == pool.len() {
            pool = next_pool;
            break;
        }
        pool = next_pool;
    }

    KmeansOutcome {
        finalized,
        noise: pool,
    }
}

/// One K-means invocation (Lloyd's algorithm) over a pool of indices.
///
/// Returns `k` member-index groups (possibly fewer when clusters empty out).
/// Seeding is k-means++-style: the first center uniform, subsequent centers
/// biased toward points far from any chosen center.
fn lloyd(embeddings: &[Vec<f32>], pool: &[usize], k: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut centers = seed_centers(embeddings, pool, k, &mut rng);
    let mut assignments: Vec<usize> = vec![0; pool.len()];

    for _ in 0..MAX_LLOYD_ROUNDS {
        let mut changed = false;

        for (slot, &idx) in pool.iter().enumerate() {
            let nearest = nearest_center(&embeddings[idx], &centers);
            if assignments[slot] != nearest {
                assignments[slot] = nearest;
                changed = true;
            }
        }

        if !changed {
            break;
        }

        for (center_idx, center) in centers.iter_mut().enumerate() {
            let members: Vec<&[f32]> = pool
                .iter()
                .enumerate()
                .filter(|(slot, _)| assignments[*slot] == center_idx)
                .map(|(_, &idx)| embeddings[idx].as_slice())
                .collect();
            if !members.is_empty() {
                *center = centroid(&members);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); centers.len()];
    for (slot, &idx) in pool.iter().enumerate() {
        groups[assignments[slot]].push(idx);
    }
    groups
}

fn seed_centers(
    embeddings: &[Vec<f32>],
    pool: &[usize],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let mut centers: Vec<Vec<f32>> = Vec::with_capacity(k);
    centers.push(embeddings[pool[rng.gen_range(0..pool.len())]].clone());

    while centers.len() < k {
        // Pick the pool point farthest from its nearest chosen center,
        // breaking exact ties by first index.
        let farthest = pool
            .iter()
            .map(|&idx| {
                let d = centers
                    .iter()
                    .map(|c| cosine_distance(&embeddings[idx], c))
                    .fold(f32::MAX, f32::min);
                (idx, d)
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx);

        match farthest {
            Some(idx) => centers.push(embeddings[idx].clone()),
            None => break,
        }
    }

    centers
}

fn nearest_center(vector: &[f32], centers: &[Vec<f32>]) -> usize {
    let mut best = 0usize;
    let mut best_distance = f32::MAX;
    for (idx, center) in centers.iter().enumerate() {
        let d = cosine_distance(vector, center);
        if d < best_distance {
            best_distance = d;
            best = idx;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PipelineParams {
        PipelineParams {
            distance_threshold: 0.3,
            max_kmeans_iterations: 10,
            min_cluster_size: 2,
            k_multiplier: 2.0,
            ..PipelineParams::default()
        }
    }

    /// Vectors spread around a base direction with tiny perturbations
    fn tight_group(base: &[f32; 3], count: usize) -> Vec<Vec<f32>> {
        (0..count)
            .map(|i| {
                let jitter = 0.01 * (i as f32);
                vec![base[0] + jitter, base[1], base[2]]
            })
            .collect()
    }

    #[test]
    fn test_estimate_k() {
        assert_eq!(estimate_k(10, 10.0), 10);
        assert_eq!(estimate_k(1000, 10.0), 30);
        // Tiny pools still get at least 2
        assert_eq!(estimate_k(1, 10.0), 2);
    }

    #[test]
    fn test_two_groups_found() {
        let mut embeddings = tight_group(&[1.0, 0.0, 0.0], 10);
        embeddings.extend(tight_group(&[0.0, 1.0, 0.0], 10));

        let outcome = cluster(&embeddings, &params());

        let total: usize = outcome.finalized.iter().map(|c| c.len()).sum();
        assert_eq!(total + outcome.noise.len(), 20);
        assert!(!outcome.finalized.is_empty());

        // No finalized cluster mixes the two directions
        for members in &outcome.finalized {
            let lefts = members.iter().filter(|&&i| i < 10).count();
            assert!(lefts == 0 || lefts == members.len());
        }
    }

    #[test]
    fn test_terminates_when_tightness_unreachable() {
        // Mutually orthogonal-ish vectors never form a tight cluster of
        // size > 1; the loop must still terminate within the cap.
        let embeddings: Vec<Vec<f32>> = (0..8)
            .map(|i| {
                let mut v = vec![0.0f32; 8];
                v[i] = 1.0;
                v
            })
            .collect();

        let outcome = cluster(&embeddings, &params());
        let total: usize = outcome.finalized.iter().map(|c| c.len()).sum();
        assert_eq!(total + outcome.noise.len(), 8);
    }

    #[test]
    fn test_empty_pool() {
        let outcome = cluster(&[], &params());
        assert!(outcome.finalized.is_empty());
        assert!(outcome.noise.is_empty());
    }

    #[test]
    fn test_zero_min_cluster_size_does_not_panic() {
        // Config validation rejects 0, but a hand-built params value must
        // still terminate cleanly once the pool drains.
        let params = PipelineParams {
            min_cluster_size: 0,
            ..params()
        };

        let embeddings = tight_group(&[1.0, 0.0, 0.0], 4);
        let outcome = cluster(&embeddings, &params);
        let total: usize = outcome.finalized.iter().map(|c| c.len()).sum();
        assert_eq!(total + outcome.noise.len(), 4);
    }
}
