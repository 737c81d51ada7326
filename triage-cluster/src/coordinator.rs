//! Sweep coordinator
//!
//! Discovers eligible tenants once per sweep, runs their pipelines with a
//! bounded number in flight, and aggregates a summary. One tenant's failed
//! run never cancels or blocks another's.

use crate::models::RunState;
use crate::pipeline::Pipeline;
use crate::services::TenantDirectory;
use crate::util::retry_step;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use triage_common::{PipelineParams, Result};

/// Aggregated counts for one whole sweep
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepSummary {
    pub tenants_processed: usize,
    pub segments_processed: usize,
    pub clusters_found: usize,
    pub tasks_created: usize,
    pub tasks_updated: usize,
    pub clusters_skipped: usize,
    pub failed_tenants: Vec<String>,
}

pub struct Coordinator {
    pipeline: Arc<Pipeline>,
    tenants: Arc<dyn TenantDirectory>,
    params: PipelineParams,
}

impl Coordinator {
    pub fn new(
        pipeline: Arc<Pipeline>,
        tenants: Arc<dyn TenantDirectory>,
        params: PipelineParams,
    ) -> Self {
        Self {
            pipeline,
            tenants,
            params,
        }
    }

    /// Run one sweep across all eligible tenants.
    ///
    /// Tenant eligibility is resolved once here and passed down. The
    /// cancellation token stops new runs from starting; in-flight runs
    /// complete and are included in the summary.
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<SweepSummary> {
        let directory = self.tenants.as_ref();
        let tenant_ids = retry_step(
            "eligible_tenants",
            self.params.step_max_attempts,
            self.params.step_backoff_ms,
            move || directory.eligible_tenants(),
        )
        .await?;

        // At most one in-flight run per tenant
        let mut seen = HashSet::new();
        let tenant_ids: Vec<String> = tenant_ids
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        tracing::info!(
            tenants = tenant_ids.len(),
            max_concurrent = self.params.max_concurrent_tenants,
            "Starting sweep"
        );

        let sessions: Vec<_> = stream::iter(tenant_ids)
            .map(|tenant_id| {
                let pipeline = Arc::clone(&self.pipeline);
                async move {
                    if cancel.is_cancelled() {
                        tracing::warn!(tenant_id = %tenant_id, "Sweep cancelled, skipping tenant");
                        return None;
                    }
                    Some(pipeline.run_tenant(&tenant_id).await)
                }
            })
            .buffer_unordered(self.params.max_concurrent_tenants.max(1))
            .collect()
            .await;

        let mut summary = SweepSummary::default();
        for session in sessions.into_iter().flatten() {
            summary.tenants_processed += 1;
            summary.segments_processed += session.metrics.segments_processed;
            summary.clusters_found += session.metrics.clusters_found;
            summary.tasks_created += session.metrics.tasks_created;
            summary.tasks_updated += session.metrics.tasks_updated;
            summary.clusters_skipped += session.metrics.clusters_skipped;
            if session.state == RunState::Failed {
                summary.failed_tenants.push(session.tenant_id);
            }
        }

        tracing::info!(
            tenants = summary.tenants_processed,
            segments = summary.segments_processed,
            clusters = summary.clusters_found,
            tasks_created = summary.tasks_created,
            tasks_updated = summary.tasks_updated,
            clusters_skipped = summary.clusters_skipped,
            failed = summary.failed_tenants.len(),
            "Sweep complete"
        );

        Ok(summary)
    }
}
