//! Deduplication of new clusters against persisted task centroids
//!
//! Nearest-neighbor matching on cosine distance. A cluster matches at most
//! one task; exact ties resolve to the first minimal index, but ordering is
//! otherwise unspecified and must not be relied upon.

use crate::engine::vector::cosine_distance;
use crate::models::Cluster;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cluster matched to an existing task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMatch {
    pub cluster_id: Uuid,
    pub task_id: Uuid,
    pub distance: f32,
}

/// Outcome of matching one run's clusters
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matched: Vec<ClusterMatch>,
    pub new: Vec<Uuid>,
}

/// Match clusters against existing task centroids.
///
/// With no existing centroids every cluster is unconditionally new.
/// Otherwise the minimum-distance task wins when its distance is strictly
/// below `match_threshold`.
pub fn match_clusters(
    clusters: &[Cluster],
    existing: &[(Uuid, Vec<f32>)],
    match_threshold: f32,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();

    for cluster in clusters {
        if existing.is_empty() {
            outcome.new.push(cluster.cluster_id);
            continue;
        }

        let mut best: Option<(Uuid, f32)> = None;
        for (task_id, centroid) in existing {
            let distance = cosine_distance(&cluster.centroid, centroid);
            if best.map(|(_, d)| distance < d).unwrap_or(true) {
                best = Some((*task_id, distance));
            }
        }

        match best {
            Some((task_id, distance)) if distance < match_threshold => {
                tracing::debug!(
                    cluster_id = %cluster.cluster_id,
                    task_id = %task_id,
                    distance,
                    "Cluster matched existing task"
                );
                outcome.matched.push(ClusterMatch {
                    cluster_id: cluster.cluster_id,
                    task_id,
                    distance,
                });
            }
            _ => outcome.new.push(cluster.cluster_id),
        }
    }

    outcome
}
