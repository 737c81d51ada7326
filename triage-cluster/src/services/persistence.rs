//! Persistence writer
//!
//! Sole mutator of tasks, task-segment links, and watermarks. Every write
//! path is safe against partial re-execution: task ids are derived from the
//! run-scoped cluster id, links go through the idempotent upsert, and
//! matched-task counters only accumulate segments that were not already
//! linked.

use crate::db::{links, tasks, watermarks};
use crate::models::{Cluster, ClusterMetrics, Segment, Task, TaskSegmentLink};
use crate::services::dedup::ClusterMatch;
use crate::services::labeling::ClusterLabel;
use sqlx::SqlitePool;
use std::collections::HashMap;
use triage_common::{Error, PipelineParams, Result};
use uuid::Uuid;

/// Origin tag stamped on every task this pipeline creates
pub const TASK_ORIGIN: &str = "behavioral-clustering";

/// Result of persisting one run's clusters
#[derive(Debug, Default, Clone, Copy)]
pub struct PersistOutcome {
    pub tasks_created: usize,
    pub tasks_updated: usize,
    pub clusters_skipped: usize,
}

pub struct PersistenceWriter {
    pool: SqlitePool,
    params: PipelineParams,
}

impl PersistenceWriter {
    pub fn new(pool: SqlitePool, params: PipelineParams) -> Self {
        Self { pool, params }
    }

    /// Priority as a bounded, non-decreasing function of reach.
    ///
    /// `cap · ln(1+u) / (ln(1+u) + shape)`: additional affected users yield
    /// diminishing marginal priority, saturating at `priority_cap`.
    pub fn priority_score(&self, distinct_user_count: i64) -> f64 {
        let reach = (1.0 + distinct_user_count.max(0) as f64).ln();
        self.params.priority_cap * reach / (reach + self.params.priority_shape)
    }

    /// Persist new clusters: one task plus member links per actionable
    /// label; fallback and non-actionable clusters are only counted.
    pub async fn persist_new_clusters(
        &self,
        tenant_id: &str,
        clusters: &HashMap<Uuid, &Cluster>,
        labels: &[ClusterLabel],
        centroids: &HashMap<Uuid, Vec<f32>>,
        segments: &HashMap<String, Segment>,
    ) -> Result<PersistOutcome> {
        let mut outcome = PersistOutcome::default();

        for label in labels {
            if label.fell_back || !label.response.actionable {
                outcome.clusters_skipped += 1;
                tracing::debug!(
                    cluster_id = %label.cluster_id,
                    fell_back = label.fell_back,
                    "Skipping non-actionable cluster"
                );
                continue;
            }

            let cluster = clusters.get(&label.cluster_id).ok_or_else(|| {
                Error::Internal(format!("Unknown cluster {} in label batch", label.cluster_id))
            })?;
            let centroid = centroids.get(&label.cluster_id).ok_or_else(|| {
                Error::Internal(format!(
                    "Centroid cache entry missing for cluster {}",
                    label.cluster_id
                ))
            })?;

            let members = member_segments(cluster, segments)?;
            let metrics = ClusterMetrics::from_segments(members.iter().copied());

            let task = Task {
                // Run-scoped cluster id doubles as the task id for retry-safe inserts
                id: cluster.cluster_id,
                tenant_id: tenant_id.to_string(),
                title: label.response.title.clone(),
                description: label.response.description.clone(),
                actionable: true,
                centroid: centroid.clone(),
                priority_score: self.priority_score(metrics.distinct_user_count),
                occurrence_count: metrics.occurrence_count,
                distinct_user_count: metrics.distinct_user_count,
                last_occurrence_at: metrics.last_occurrence_at,
                origin: TASK_ORIGIN.to_string(),
            };
            tasks::insert_task(&self.pool, &task).await?;

            for segment in &members {
                links::upsert_link(&self.pool, &segment_link(task.id, segment)).await?;
            }

            tracing::info!(
                tenant_id,
                task_id = %task.id,
                segments = members.len(),
                distinct_users = metrics.distinct_user_count,
                "Created task from new cluster"
            );
            outcome.tasks_created += 1;
        }

        Ok(outcome)
    }

    /// Apply matched clusters to their existing tasks, accumulating
    /// counters by genuinely new segments only.
    pub async fn apply_matches(
        &self,
        matches: &[ClusterMatch],
        clusters: &HashMap<Uuid, &Cluster>,
        segments: &HashMap<String, Segment>,
    ) -> Result<PersistOutcome> {
        let mut outcome = PersistOutcome::default();

        for m in matches {
            let cluster = clusters.get(&m.cluster_id).ok_or_else(|| {
                Error::Internal(format!("Unknown matched cluster {}", m.cluster_id))
            })?;

            let existing = links::existing_link_keys(&self.pool, m.task_id).await?;
            let members = member_segments(cluster, segments)?;
            let new_segments: Vec<&Segment> = members
                .into_iter()
                .filter(|s| {
                    !existing.contains(&(s.session_id.clone(), s.start, s.end))
                })
                .collect();

            if new_segments.is_empty() {
                tracing::debug!(
                    task_id = %m.task_id,
                    cluster_id = %m.cluster_id,
                    "Matched cluster has no unlinked segments"
                );
                continue;
            }

            let new_metrics = ClusterMetrics::from_segments(new_segments.iter().copied());
            let task = tasks::get_task(&self.pool, m.task_id).await?;

            let occurrence_count = task.occurrence_count + new_metrics.occurrence_count;
            let distinct_user_count = task.distinct_user_count + new_metrics.distinct_user_count;
            let last_occurrence_at = match (task.last_occurrence_at, new_metrics.last_occurrence_at)
            {
                (Some(old), Some(new)) => Some(old.max(new)),
                (old, new) => old.or(new),
            };

            tasks::update_task_counters(
                &self.pool,
                m.task_id,
                occurrence_count,
                distinct_user_count,
                last_occurrence_at,
                self.priority_score(distinct_user_count),
            )
            .await?;

            for segment in &new_segments {
                links::upsert_link(&self.pool, &segment_link(m.task_id, segment)).await?;
            }

            tracing::info!(
                task_id = %m.task_id,
                cluster_id = %m.cluster_id,
                new_segments = new_segments.len(),
                distance = m.distance,
                "Updated matched task"
            );
            outcome.tasks_updated += 1;
        }

        Ok(outcome)
    }

    /// Advance the tenant watermark to the latest segment timestamp of this
    /// run. Called only after all task and link writes succeeded.
    pub async fn advance_watermark(&self, tenant_id: &str, segments: &[Segment]) -> Result<()> {
        let Some(latest) = segments.iter().map(|s| s.end).max() else {
            return Ok(());
        };
        watermarks::advance_watermark(&self.pool, tenant_id, latest, segments.len() as i64).await
    }
}

fn member_segments<'a>(
    cluster: &Cluster,
    segments: &'a HashMap<String, Segment>,
) -> Result<Vec<&'a Segment>> {
    cluster
        .segment_ids
        .iter()
        .map(|id| {
            segments.get(id).ok_or_else(|| {
                Error::Internal(format!("Cluster references unknown segment {}", id))
            })
        })
        .collect()
}

fn segment_link(task_id: Uuid, segment: &Segment) -> TaskSegmentLink {
    TaskSegmentLink {
        task_id,
        session_id: segment.session_id.clone(),
        segment_start: segment.start,
        segment_end: segment.end,
        content: segment.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::services::labeling::LabelResponse;
    use chrono::{Duration, Utc};

    fn segment(id: &str, user: &str, session: &str) -> Segment {
        // Whole-second timestamps keyed off the document id keep link keys stable
        let base: chrono::DateTime<Utc> = "2026-08-10T09:00:00Z".parse().unwrap();
        let start = base + Duration::minutes(id.as_bytes()[0] as i64);
        Segment {
            document_id: id.to_string(),
            session_id: session.to_string(),
            start,
            end: start + Duration::minutes(5),
            user_id: user.to_string(),
            content: format!("behavior {}", id),
            embedding: vec![1.0, 0.0],
        }
    }

    fn fixtures() -> (Cluster, HashMap<String, Segment>) {
        let segments: HashMap<String, Segment> = [
            segment("a", "u1", "s1"),
            segment("b", "u1", "s2"),
            segment("c", "u2", "s3"),
        ]
        .into_iter()
        .map(|s| (s.document_id.clone(), s))
        .collect();

        let cluster = Cluster {
            cluster_id: Uuid::new_v4(),
            segment_ids: vec!["a".into(), "b".into(), "c".into()],
            centroid: vec![1.0, 0.0],
        };
        (cluster, segments)
    }

    fn actionable_label(cluster_id: Uuid) -> ClusterLabel {
        ClusterLabel {
            cluster_id,
            response: LabelResponse {
                actionable: true,
                title: "Checkout retry loop".to_string(),
                description: "Users retry payment repeatedly".to_string(),
            },
            fell_back: false,
        }
    }

    async fn writer() -> PersistenceWriter {
        PersistenceWriter::new(test_pool().await, PipelineParams::default())
    }

    #[tokio::test]
    async fn test_priority_monotonic_and_bounded() {
        let writer = PersistenceWriter {
            pool: SqlitePool::connect_lazy("sqlite::memory:").unwrap(),
            params: PipelineParams::default(),
        };

        let mut last = -1.0;
        for users in [0, 1, 2, 5, 10, 100, 10_000, 1_000_000] {
            let score = writer.priority_score(users);
            assert!(score >= last, "priority regressed at {} users", users);
            assert!(score <= writer.params.priority_cap);
            last = score;
        }
        assert_eq!(writer.priority_score(0), 0.0);
    }

    #[tokio::test]
    async fn test_new_cluster_creates_task_and_links() {
        let writer = writer().await;
        let (cluster, segments) = fixtures();
        let clusters = HashMap::from([(cluster.cluster_id, &cluster)]);
        let centroids = HashMap::from([(cluster.cluster_id, vec![1.0, 0.0])]);

        let outcome = writer
            .persist_new_clusters(
                "tenant-1",
                &clusters,
                &[actionable_label(cluster.cluster_id)],
                &centroids,
                &segments,
            )
            .await
            .unwrap();

        assert_eq!(outcome.tasks_created, 1);
        let task = tasks::get_task(&writer.pool, cluster.cluster_id).await.unwrap();
        assert_eq!(task.occurrence_count, 3);
        assert_eq!(task.distinct_user_count, 2);
        assert_eq!(links::count_links(&writer.pool, task.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_replay_does_not_double_write() {
        let writer = writer().await;
        let (cluster, segments) = fixtures();
        let clusters = HashMap::from([(cluster.cluster_id, &cluster)]);
        let centroids = HashMap::from([(cluster.cluster_id, vec![1.0, 0.0])]);
        let labels = vec![actionable_label(cluster.cluster_id)];

        for _ in 0..2 {
            writer
                .persist_new_clusters("tenant-1", &clusters, &labels, &centroids, &segments)
                .await
                .unwrap();
        }

        let task = tasks::get_task(&writer.pool, cluster.cluster_id).await.unwrap();
        assert_eq!(task.occurrence_count, 3);
        assert_eq!(links::count_links(&writer.pool, task.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fallback_and_non_actionable_skipped() {
        let writer = writer().await;
        let (cluster, segments) = fixtures();
        let clusters = HashMap::from([(cluster.cluster_id, &cluster)]);
        let centroids = HashMap::from([(cluster.cluster_id, vec![1.0, 0.0])]);

        let mut fallback = actionable_label(cluster.cluster_id);
        fallback.fell_back = true;

        let outcome = writer
            .persist_new_clusters("tenant-1", &clusters, &[fallback], &centroids, &segments)
            .await
            .unwrap();

        assert_eq!(outcome.tasks_created, 0);
        assert_eq!(outcome.clusters_skipped, 1);
        assert!(
            tasks::fetch_task_centroids(&writer.pool, "tenant-1", TASK_ORIGIN)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_matched_cluster_accumulates_new_segments_only() {
        let writer = writer().await;
        let (cluster, segments) = fixtures();
        let clusters = HashMap::from([(cluster.cluster_id, &cluster)]);
        let centroids = HashMap::from([(cluster.cluster_id, vec![1.0, 0.0])]);

        // Seed the task with the first run
        writer
            .persist_new_clusters(
                "tenant-1",
                &clusters,
                &[actionable_label(cluster.cluster_id)],
                &centroids,
                &segments,
            )
            .await
            .unwrap();

        // A later run matches the same task with one old and one new segment
        let fresh = segment("d", "u3", "s9");
        let mut next_segments = segments.clone();
        next_segments.insert("d".to_string(), fresh);
        let next_cluster = Cluster {
            cluster_id: Uuid::new_v4(),
            segment_ids: vec!["a".into(), "d".into()],
            centroid: vec![1.0, 0.0],
        };
        let next_clusters = HashMap::from([(next_cluster.cluster_id, &next_cluster)]);

        let outcome = writer
            .apply_matches(
                &[ClusterMatch {
                    cluster_id: next_cluster.cluster_id,
                    task_id: cluster.cluster_id,
                    distance: 0.1,
                }],
                &next_clusters,
                &next_segments,
            )
            .await
            .unwrap();

        assert_eq!(outcome.tasks_updated, 1);
        let task = tasks::get_task(&writer.pool, cluster.cluster_id).await.unwrap();
        // Only segment "d" is new: 3 + 1 occurrences, 2 + 1 users
        assert_eq!(task.occurrence_count, 4);
        assert_eq!(task.distinct_user_count, 3);
        assert_eq!(links::count_links(&writer.pool, task.id).await.unwrap(), 4);

        // Replaying the same match changes nothing
        let outcome = writer
            .apply_matches(
                &[ClusterMatch {
                    cluster_id: next_cluster.cluster_id,
                    task_id: cluster.cluster_id,
                    distance: 0.1,
                }],
                &next_clusters,
                &next_segments,
            )
            .await
            .unwrap();
        assert_eq!(outcome.tasks_updated, 0);
        let task = tasks::get_task(&writer.pool, cluster.cluster_id).await.unwrap();
        assert_eq!(task.occurrence_count, 4);
    }

    #[tokio::test]
    async fn test_watermark_follows_latest_segment() {
        let writer = writer().await;
        let (_, segments) = fixtures();
        let all: Vec<Segment> = segments.values().cloned().collect();
        let latest = all.iter().map(|s| s.end).max().unwrap();

        writer.advance_watermark("tenant-1", &all).await.unwrap();

        let mark = watermarks::get_watermark(&writer.pool, "tenant-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(mark.last_processed_at, latest);
        assert_eq!(mark.segments_processed, 3);

        // Empty runs leave the watermark untouched
        writer.advance_watermark("tenant-1", &[]).await.unwrap();
        let unchanged = watermarks::get_watermark(&writer.pool, "tenant-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.last_processed_at, latest);
    }
}
