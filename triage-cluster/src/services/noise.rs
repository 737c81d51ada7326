//! Noise resolution policy
//!
//! Low-volume tenants keep their outliers: each noise segment becomes a
//! singleton cluster so it still gets an actionability verdict. At scale,
//! outliers are expected and not worth the persistence cost, so noise is
//! dropped silently.

use crate::models::{Cluster, ClusteringResult};
use triage_common::PipelineParams;
use uuid::Uuid;

/// Resolve the noise set of a clustering result in place.
///
/// `total_segments` is the size of the original input batch, not the noise
/// set. Runs strictly after the cluster engine.
pub fn resolve(
    result: &mut ClusteringResult,
    total_segments: usize,
    embeddings_by_id: &std::collections::HashMap<String, Vec<f32>>,
    params: &PipelineParams,
) {
    if result.noise_segment_ids.is_empty() {
        return;
    }

    if total_segments >= params.noise_discard_threshold {
        tracing::debug!(
            dropped = result.noise_segment_ids.len(),
            total_segments,
            "Dropping noise segments (at or above discard threshold)"
        );
        return;
    }

    let noise = std::mem::take(&mut result.noise_segment_ids);
    tracing::debug!(
        singletons = noise.len(),
        total_segments,
        "Converting noise segments to singleton clusters"
    );

    for segment_id in noise {
        let centroid = embeddings_by_id
            .get(&segment_id)
            .cloned()
            .unwrap_or_default();
        result.push_cluster(Cluster {
            cluster_id: Uuid::new_v4(),
            segment_ids: vec![segment_id],
            centroid,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn result_with_noise(noise: &[&str]) -> ClusteringResult {
        ClusteringResult {
            clusters: Vec::new(),
            noise_segment_ids: noise.iter().map(|s| s.to_string()).collect(),
            segment_to_cluster: HashMap::new(),
        }
    }

    fn embeddings(ids: &[&str]) -> HashMap<String, Vec<f32>> {
        ids.iter()
            .map(|id| (id.to_string(), vec![1.0, 0.0]))
            .collect()
    }

    #[test]
    fn test_below_threshold_converts_to_singletons() {
        let params = PipelineParams {
            noise_discard_threshold: 100,
            ..PipelineParams::default()
        };
        let mut result = result_with_noise(&["a", "b"]);

        // One below the threshold: singletons
        resolve(&mut result, 99, &embeddings(&["a", "b"]), &params);

        assert!(result.noise_segment_ids.is_empty());
        assert_eq!(result.clusters.len(), 2);
        assert!(result.clusters.iter().all(|c| c.size() == 1));
        assert_eq!(result.segment_to_cluster.len(), 2);
    }

    #[test]
    fn test_at_threshold_drops_noise() {
        let params = PipelineParams {
            noise_discard_threshold: 100,
            ..PipelineParams::default()
        };
        let mut result = result_with_noise(&["a", "b"]);

        resolve(&mut result, 100, &embeddings(&["a", "b"]), &params);

        // Noise list untouched, no singleton clusters created
        assert_eq!(result.noise_segment_ids.len(), 2);
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn test_no_noise_is_a_no_op() {
        let params = PipelineParams::default();
        let mut result = result_with_noise(&[]);
        resolve(&mut result, 10, &HashMap::new(), &params);
        assert!(result.clusters.is_empty());
    }
}
