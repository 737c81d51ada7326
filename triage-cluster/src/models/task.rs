//! Persisted task, segment link, and watermark rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A long-lived, deduplicated backlog item.
///
/// Created once per genuinely new cluster, mutated in place on every
/// subsequent match. Never deleted by this pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub tenant_id: String,
    pub title: String,
    pub description: String,
    pub actionable: bool,
    pub centroid: Vec<f32>,
    pub priority_score: f64,
    pub occurrence_count: i64,
    pub distinct_user_count: i64,
    pub last_occurrence_at: Option<DateTime<Utc>>,
    pub origin: String,
}

/// Association between a task and one observed segment window.
///
/// At most one link exists per `(task_id, session_id, segment_start,
/// segment_end)`; that uniqueness is what makes persistence retry-safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSegmentLink {
    pub task_id: Uuid,
    pub session_id: String,
    pub segment_start: DateTime<Utc>,
    pub segment_end: DateTime<Utc>,
    pub content: String,
}

/// Per-tenant fetch-window checkpoint.
///
/// Advanced only after a run reaches its terminal successful state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringWatermark {
    pub tenant_id: String,
    pub last_processed_at: DateTime<Utc>,
    pub segments_processed: i64,
}
