//! Cluster and clustering-result types

use crate::models::Segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// A grouping of segments produced by one pipeline run.
///
/// `cluster_id` is run-scoped and not stable across runs. The centroid is the
/// element-wise mean of member embeddings in the original embedding space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: Uuid,
    pub segment_ids: Vec<String>,
    pub centroid: Vec<f32>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.segment_ids.len()
    }
}

/// Output of the cluster engine for one batch of segments.
///
/// Every input segment appears exactly once, either in some cluster's
/// members or in `noise_segment_ids`, never in both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusteringResult {
    pub clusters: Vec<Cluster>,
    pub noise_segment_ids: Vec<String>,
    pub segment_to_cluster: HashMap<String, Uuid>,
}

impl ClusteringResult {
    /// Add a cluster and index its members in `segment_to_cluster`
    pub fn push_cluster(&mut self, cluster: Cluster) {
        for id in &cluster.segment_ids {
            self.segment_to_cluster.insert(id.clone(), cluster.cluster_id);
        }
        self.clusters.push(cluster);
    }

    /// Verify the partition invariant against the original input set.
    ///
    /// Returns an error string naming the first violation found.
    pub fn check_partition(&self, input_ids: &[String]) -> std::result::Result<(), String> {
        let mut seen: HashSet<&str> = HashSet::new();

        for cluster in &self.clusters {
            for id in &cluster.segment_ids {
                if !seen.insert(id) {
                    return Err(format!("segment {} assigned more than once", id));
                }
            }
        }
        for id in &self.noise_segment_ids {
            if !seen.insert(id) {
                return Err(format!("segment {} is both clustered and noise", id));
            }
        }

        for id in input_ids {
            if !seen.contains(id.as_str()) {
                return Err(format!("segment {} was dropped", id));
            }
        }
        if seen.len() != input_ids.len() {
            return Err(format!(
                "result covers {} segments, input had {}",
                seen.len(),
                input_ids.len()
            ));
        }
        Ok(())
    }
}

/// Aggregate metrics of a cluster, computed over its member segments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterMetrics {
    pub occurrence_count: i64,
    pub distinct_user_count: i64,
    pub last_occurrence_at: Option<DateTime<Utc>>,
}

impl ClusterMetrics {
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a Segment>) -> Self {
        let mut users: HashSet<&str> = HashSet::new();
        let mut count = 0i64;
        let mut last: Option<DateTime<Utc>> = None;

        for segment in segments {
            count += 1;
            users.insert(&segment.user_id);
            last = Some(match last {
                Some(prev) => prev.max(segment.end),
                None => segment.end,
            });
        }

        Self {
            occurrence_count: count,
            distinct_user_count: users.len() as i64,
            last_occurrence_at: last,
        }
    }
}
