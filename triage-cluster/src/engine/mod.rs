//! Cluster engine
//!
//! Partitions one tenant's segment batch into clusters plus a noise set.
//! Strategy selection is a pure function of batch size: small batches get
//! complete-linkage agglomerative merging (no noise), larger batches go
//! through the iterative bisecting K-means loop.
//!
//! Centroids are always computed in the original embedding space; nothing
//! dimensionality-reduced is ever persisted.

pub mod agglomerative;
pub mod kmeans;
pub mod vector;

use crate::models::{Cluster, ClusteringResult, Segment};
use triage_common::{Error, PipelineParams, Result};
use uuid::Uuid;

/// Which clustering strategy a batch of `n` segments gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Agglomerative,
    BisectingKmeans,
}

pub fn select_strategy(n: usize, params: &PipelineParams) -> Strategy {
    if n < params.agglomerative_threshold {
        Strategy::Agglomerative
    } else {
        Strategy::BisectingKmeans
    }
}

/// Cluster a batch of segments.
///
/// The clustering math is CPU-bound and runs on the blocking pool so it
/// cannot starve other tenants' runs on the I/O threads.
pub async fn cluster_segments(
    segments: Vec<Segment>,
    params: &PipelineParams,
) -> Result<ClusteringResult> {
    let params = params.clone();
    tokio::task::spawn_blocking(move || cluster_segments_blocking(&segments, &params))
        .await
        .map_err(|e| Error::Internal(format!("Clustering task panicked: {}", e)))?
}

fn cluster_segments_blocking(
    segments: &[Segment],
    params: &PipelineParams,
) -> Result<ClusteringResult> {
    if segments.is_empty() {
        return Ok(ClusteringResult::default());
    }

    check_dimensions(segments, params)?;

    let embeddings: Vec<Vec<f32>> = segments.iter().map(|s| s.embedding.clone()).collect();
    let strategy = select_strategy(segments.len(), params);

    tracing::debug!(
        segments = segments.len(),
        strategy = ?strategy,
        "Clustering segment batch"
    );

    let (groups, noise_indices) = match strategy {
        Strategy::Agglomerative => {
            // All segments are assigned; this path produces no noise
            (
                agglomerative::cluster(&embeddings, params.distance_threshold),
                Vec::new(),
            )
        }
        Strategy::BisectingKmeans => {
            let outcome = kmeans::cluster(&embeddings, params);
            (outcome.finalized, outcome.noise)
        }
    };

    let mut result = ClusteringResult::default();
    for members in groups {
        if members.is_empty() {
            continue;
        }
        let vectors: Vec<&[f32]> = members
            .iter()
            .map(|&i| segments[i].embedding.as_slice())
            .collect();
        result.push_cluster(Cluster {
            cluster_id: Uuid::new_v4(),
            segment_ids: members
                .iter()
                .map(|&i| segments[i].document_id.clone())
                .collect(),
            centroid: vector::centroid(&vectors),
        });
    }
    result.noise_segment_ids = noise_indices
        .into_iter()
        .map(|i| segments[i].document_id.clone())
        .collect();

    let input_ids: Vec<String> = segments.iter().map(|s| s.document_id.clone()).collect();
    result
        .check_partition(&input_ids)
        .map_err(Error::Clustering)?;

    Ok(result)
}

/// Reject batches with inconsistent embedding dimensionality before any
/// distance computation sees them.
fn check_dimensions(segments: &[Segment], params: &PipelineParams) -> Result<()> {
    let expected = params.embedding_dim.unwrap_or(segments[0].embedding.len());
    if expected == 0 {
        return Err(Error::Clustering("empty embeddings".to_string()));
    }
    for segment in segments {
        if segment.embedding.len() != expected {
            return Err(Error::Clustering(format!(
                "segment {} has embedding dimension {}, expected {}",
                segment.document_id,
                segment.embedding.len(),
                expected
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn segment(id: &str, embedding: Vec<f32>) -> Segment {
        Segment {
            document_id: id.to_string(),
            session_id: format!("session-{}", id),
            start: Utc::now(),
            end: Utc::now(),
            user_id: format!("user-{}", id),
            content: format!("content {}", id),
            embedding,
        }
    }

    #[test]
    fn test_strategy_selection_boundary() {
        let params = PipelineParams {
            agglomerative_threshold: 50,
            ..PipelineParams::default()
        };
        assert_eq!(select_strategy(49, &params), Strategy::Agglomerative);
        assert_eq!(select_strategy(50, &params), Strategy::BisectingKmeans);
    }

    #[tokio::test]
    async fn test_small_batch_all_assigned() {
        let params = PipelineParams::default();
        let segments = vec![
            segment("a", vec![1.0, 0.0]),
            segment("b", vec![0.99, 0.02]),
            segment("c", vec![0.0, 1.0]),
        ];

        let result = cluster_segments(segments, &params).await.unwrap();
        assert!(result.noise_segment_ids.is_empty());
        let total: usize = result.clusters.iter().map(|c| c.size()).sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_centroid_is_mean_of_members() {
        let params = PipelineParams::default();
        let segments = vec![
            segment("a", vec![1.0, 0.0]),
            segment("b", vec![0.8, 0.0]),
        ];

        let result = cluster_segments(segments, &params).await.unwrap();
        let joint = result.clusters.iter().find(|c| c.size() == 2);
        let cluster = joint.expect("parallel embeddings should merge");
        assert!((cluster.centroid[0] - 0.9).abs() < 1e-6);
        assert_eq!(cluster.centroid[1], 0.0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let params = PipelineParams::default();
        let segments = vec![
            segment("a", vec![1.0, 0.0]),
            segment("b", vec![1.0, 0.0, 0.0]),
        ];

        let result = cluster_segments(segments, &params).await;
        assert!(matches!(result, Err(Error::Clustering(_))));
    }

    #[tokio::test]
    async fn test_large_batch_partition_invariant() {
        let params = PipelineParams {
            agglomerative_threshold: 10,
            ..PipelineParams::default()
        };
        // 60 segments in three directions
        let mut segments = Vec::new();
        for i in 0..60 {
            let mut v = vec![0.0f32; 3];
            v[i % 3] = 1.0;
            v[(i + 1) % 3] = 0.01 * (i as f32 / 60.0);
            segments.push(segment(&format!("s{}", i), v));
        }
        let ids: Vec<String> = segments.iter().map(|s| s.document_id.clone()).collect();

        let result = cluster_segments(segments, &params).await.unwrap();
        assert!(result.check_partition(&ids).is_ok());
    }
}
