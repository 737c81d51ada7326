//! Per-tenant pipeline run
//!
//! Sequences fetch → cluster → match → label → persist for one tenant. Each
//! step is a retryable unit of work; the run as a whole carries a deadline.
//! Whatever happens, the centroid cache entry for the run is released.

use crate::db::{tasks, watermarks};
use crate::engine;
use crate::models::{Cluster, ClusterMetrics, RunSession, RunState, Segment};
use crate::services::{
    dedup, labeling, noise, CentroidCache, LabelRequest, Labeler, MatchOutcome, PersistenceWriter,
    SegmentSource, TASK_ORIGIN,
};
use crate::util::retry_step;
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use triage_common::{Error, PipelineParams, Result};
use uuid::Uuid;

/// One tenant's pipeline, wired to its collaborators
pub struct Pipeline {
    pool: SqlitePool,
    params: PipelineParams,
    segment_source: Arc<dyn SegmentSource>,
    labeler: Arc<dyn Labeler>,
    cache: CentroidCache,
}

impl Pipeline {
    pub fn new(
        pool: SqlitePool,
        params: PipelineParams,
        segment_source: Arc<dyn SegmentSource>,
        labeler: Arc<dyn Labeler>,
        cache: CentroidCache,
    ) -> Self {
        Self {
            pool,
            params,
            segment_source,
            labeler,
            cache,
        }
    }

    /// Execute one run for a tenant.
    ///
    /// Never returns an error: failures land in the returned session's
    /// `Failed` state so one tenant cannot abort a sweep.
    pub async fn run_tenant(&self, tenant_id: &str) -> RunSession {
        let mut session = RunSession::new(tenant_id.to_string());
        tracing::info!(
            run_id = %session.run_id,
            tenant_id,
            "Starting pipeline run"
        );

        let deadline = Duration::from_secs(self.params.run_timeout_secs);
        let outcome = tokio::time::timeout(deadline, self.execute(&mut session)).await;

        // Release cached centroids on success and failure alike
        self.cache.delete(session.run_id).await;

        match outcome {
            Ok(Ok(())) => {
                tracing::info!(
                    run_id = %session.run_id,
                    tenant_id,
                    segments = session.metrics.segments_processed,
                    clusters = session.metrics.clusters_found,
                    tasks_created = session.metrics.tasks_created,
                    tasks_updated = session.metrics.tasks_updated,
                    clusters_skipped = session.metrics.clusters_skipped,
                    "Pipeline run complete"
                );
            }
            Ok(Err(e)) => {
                tracing::error!(
                    run_id = %session.run_id,
                    tenant_id,
                    error = %e,
                    "Pipeline run failed"
                );
                session.fail(e.to_string());
            }
            Err(_) => {
                let e = Error::Timeout(self.params.run_timeout_secs);
                tracing::error!(
                    run_id = %session.run_id,
                    tenant_id,
                    error = %e,
                    "Pipeline run timed out"
                );
                session.fail(e.to_string());
            }
        }

        session
    }

    async fn execute(&self, session: &mut RunSession) -> Result<()> {
        let tenant_id = session.tenant_id.clone();
        let tenant = tenant_id.as_str();
        let attempts = self.params.step_max_attempts;
        let backoff = self.params.step_backoff_ms;

        // FETCHING: watermark-bounded window against the segment source
        let pool = &self.pool;
        let mark = retry_step("fetch_watermark", attempts, backoff, move || {
            watermarks::get_watermark(pool, tenant)
        })
        .await?;
        let since = match mark {
            Some(mark) => mark.last_processed_at,
            None => Utc::now() - ChronoDuration::hours(self.params.lookback_hours),
        };
        let until = Utc::now();

        let source = self.segment_source.as_ref();
        let segments = retry_step("fetch_segments", attempts, backoff, move || {
            source.fetch_segments(tenant, since, until)
        })
        .await?;
        session.metrics.segments_processed = segments.len();

        if segments.len() < self.params.min_segments_to_cluster {
            tracing::info!(
                run_id = %session.run_id,
                tenant_id = %tenant_id,
                segments = segments.len(),
                minimum = self.params.min_segments_to_cluster,
                "Too few segments, short-circuiting run"
            );
            session.transition_to(RunState::Done);
            return Ok(());
        }

        // CLUSTERING: engine + noise resolution, centroids into the cache
        session.transition_to(RunState::Clustering);
        let batch = &segments;
        let params = &self.params;
        let mut result = retry_step("cluster_segments", attempts, backoff, move || {
            engine::cluster_segments(batch.clone(), params)
        })
        .await?;

        let segments_by_id: HashMap<String, Segment> = segments
            .iter()
            .map(|s| (s.document_id.clone(), s.clone()))
            .collect();
        let embeddings_by_id: HashMap<String, Vec<f32>> = segments
            .iter()
            .map(|s| (s.document_id.clone(), s.embedding.clone()))
            .collect();
        noise::resolve(&mut result, segments.len(), &embeddings_by_id, &self.params);
        session.metrics.clusters_found = result.clusters.len();

        let centroids: HashMap<Uuid, Vec<f32>> = result
            .clusters
            .iter()
            .map(|c| (c.cluster_id, c.centroid.clone()))
            .collect();
        self.cache
            .put(
                session.run_id,
                centroids,
                Duration::from_secs(self.params.centroid_cache_ttl_secs),
            )
            .await;

        // MATCHING: nearest neighbor against persisted task centroids
        session.transition_to(RunState::Matching);
        let existing = retry_step("fetch_task_centroids", attempts, backoff, move || {
            tasks::fetch_task_centroids(pool, tenant, TASK_ORIGIN)
        })
        .await?;
        let outcome = dedup::match_clusters(&result.clusters, &existing, self.params.match_threshold);
        tracing::debug!(
            run_id = %session.run_id,
            matched = outcome.matched.len(),
            new = outcome.new.len(),
            "Cluster matching complete"
        );

        // LABELING: new clusters only, concurrent, total
        session.transition_to(RunState::Labeling);
        let clusters_by_id: HashMap<Uuid, &Cluster> = result
            .clusters
            .iter()
            .map(|c| (c.cluster_id, c))
            .collect();
        let labels = labeling::label_clusters(
            self.labeler.as_ref(),
            self.label_requests(&outcome, &clusters_by_id, &segments_by_id)?,
            self.params.label_concurrency,
        )
        .await;

        // PERSISTING: idempotent writes, then the watermark
        session.transition_to(RunState::Persisting);
        let writer = PersistenceWriter::new(self.pool.clone(), self.params.clone());
        let run_id = session.run_id;
        let writer_ref = &writer;
        let cache = &self.cache;
        let clusters_ref = &clusters_by_id;
        let labels_ref = &labels;
        let matched_ref = &outcome.matched;
        let segments_map = &segments_by_id;
        let persisted = retry_step("persist", attempts, backoff, move || async move {
            let centroids = cache.get(run_id).await.ok_or_else(|| {
                Error::Internal(format!("Centroid cache entry missing for run {}", run_id))
            })?;

            let mut created = writer_ref
                .persist_new_clusters(tenant, clusters_ref, labels_ref, &centroids, segments_map)
                .await?;
            let updated = writer_ref
                .apply_matches(matched_ref, clusters_ref, segments_map)
                .await?;
            created.tasks_updated = updated.tasks_updated;

            writer_ref.advance_watermark(tenant, batch).await?;
            Ok(created)
        })
        .await?;

        session.metrics.tasks_created = persisted.tasks_created;
        session.metrics.tasks_updated = persisted.tasks_updated;
        session.metrics.clusters_skipped = persisted.clusters_skipped;

        session.transition_to(RunState::Done);
        Ok(())
    }

    /// Assemble one labeling request per new cluster: a bounded sample of
    /// member contents plus aggregate metrics.
    fn label_requests(
        &self,
        outcome: &MatchOutcome,
        clusters_by_id: &HashMap<Uuid, &Cluster>,
        segments_by_id: &HashMap<String, Segment>,
    ) -> Result<Vec<(Uuid, LabelRequest)>> {
        outcome
            .new
            .iter()
            .map(|cluster_id| {
                let cluster = clusters_by_id.get(cluster_id).ok_or_else(|| {
                    Error::Internal(format!("Unknown new cluster {}", cluster_id))
                })?;

                let members: Vec<&Segment> = cluster
                    .segment_ids
                    .iter()
                    .filter_map(|id| segments_by_id.get(id))
                    .collect();
                let metrics = ClusterMetrics::from_segments(members.iter().copied());
                let sample_contents: Vec<String> = members
                    .iter()
                    .take(self.params.label_sample_size)
                    .map(|s| s.content.clone())
                    .collect();

                Ok((
                    *cluster_id,
                    LabelRequest {
                        sample_contents,
                        distinct_user_count: metrics.distinct_user_count,
                        occurrence_count: metrics.occurrence_count,
                        last_occurrence_at: metrics.last_occurrence_at,
                    },
                ))
            })
            .collect()
    }
}
