//! Pipeline run state machine
//!
//! A run progresses through five sequential steps:
//! FETCHING → CLUSTERING → MATCHING → LABELING → PERSISTING → DONE,
//! with FAILED reachable from any non-terminal state and a short-circuit
//! DONE straight from FETCHING when too few segments were fetched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    /// Querying the segment source, bounded by the watermark
    Fetching,
    /// Cluster engine + noise resolution
    Clustering,
    /// Deduplication against persisted task centroids
    Matching,
    /// Concurrent labeling of new clusters
    Labeling,
    /// Task/link writes and watermark advance
    Persisting,
    /// Run finished successfully
    Done,
    /// Run aborted with an unrecoverable error
    Failed,
}

/// Counters accumulated across one run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub segments_processed: usize,
    pub clusters_found: usize,
    pub tasks_created: usize,
    pub tasks_updated: usize,
    pub clusters_skipped: usize,
}

/// One tenant's pipeline run (in-memory state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    pub run_id: Uuid,
    pub tenant_id: String,
    pub state: RunState,
    pub metrics: RunMetrics,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunSession {
    pub fn new(tenant_id: String) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            tenant_id,
            state: RunState::Fetching,
            metrics: RunMetrics::default(),
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new state, stamping the end time on terminal states
    pub fn transition_to(&mut self, new_state: RunState) {
        tracing::debug!(
            run_id = %self.run_id,
            tenant_id = %self.tenant_id,
            old_state = ?self.state,
            new_state = ?new_state,
            "Run state transition"
        );
        self.state = new_state;
        if self.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Mark the run failed with an error message
    pub fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.transition_to(RunState::Failed);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RunState::Done | RunState::Failed)
    }
}
