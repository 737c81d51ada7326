//! Behavioral segment as delivered by the segment source

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit of observed behavior for a tenant.
///
/// Segments are produced by the upstream summarization/embedding collaborator
/// and are read-only to this pipeline. `document_id` is the stable key,
/// unique per tenant. The embedding has a fixed dimensionality per
/// tenant/model version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub document_id: String,
    pub session_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub user_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
}
