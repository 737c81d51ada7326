//! Labeling orchestration
//!
//! Only genuinely new clusters get labeled; matched clusters keep the label
//! of the task they matched. Requests fan out concurrently with a per-run
//! cap, and a failure for one cluster never affects another: this step is
//! total, falling back to a deterministic not-actionable label.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use triage_common::Result;
use uuid::Uuid;

/// Maximum title length taken from sample content on the fallback path
const FALLBACK_TITLE_CHARS: usize = 80;

/// Request to the labeling collaborator for one cluster
#[derive(Debug, Clone, Serialize)]
pub struct LabelRequest {
    pub sample_contents: Vec<String>,
    pub distinct_user_count: i64,
    pub occurrence_count: i64,
    pub last_occurrence_at: Option<DateTime<Utc>>,
}

/// Label/actionability verdict for one cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelResponse {
    pub actionable: bool,
    pub title: String,
    pub description: String,
}

/// Labeling result for one cluster; `fell_back` clusters are excluded from
/// persistence and counted as skipped.
#[derive(Debug, Clone)]
pub struct ClusterLabel {
    pub cluster_id: Uuid,
    pub response: LabelResponse,
    pub fell_back: bool,
}

/// Seam for the labeling collaborator
#[async_trait]
pub trait Labeler: Send + Sync {
    async fn label(&self, request: &LabelRequest) -> Result<LabelResponse>;
}

/// HTTP client for the labeling collaborator
pub struct HttpLabeler {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLabeler {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Labeler for HttpLabeler {
    async fn label(&self, request: &LabelRequest) -> Result<LabelResponse> {
        let url = format!("{}/label", self.base_url);

        let response: LabelResponse = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response)
    }
}

/// Label a batch of new clusters concurrently.
///
/// Always returns one result per input cluster; individual failures resolve
/// locally to the fallback label.
pub async fn label_clusters(
    labeler: &dyn Labeler,
    requests: Vec<(Uuid, LabelRequest)>,
    concurrency: usize,
) -> Vec<ClusterLabel> {
    stream::iter(requests)
        .map(|(cluster_id, request)| async move {
            match labeler.label(&request).await {
                Ok(response) => {
                    tracing::debug!(
                        cluster_id = %cluster_id,
                        actionable = response.actionable,
                        "Cluster labeled"
                    );
                    ClusterLabel {
                        cluster_id,
                        response,
                        fell_back: false,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        cluster_id = %cluster_id,
                        error = %e,
                        "Labeling failed, using fallback label"
                    );
                    ClusterLabel {
                        cluster_id,
                        response: fallback_label(&request),
                        fell_back: true,
                    }
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

/// Deterministic not-actionable label derived from the first sample content
fn fallback_label(request: &LabelRequest) -> LabelResponse {
    let source = request
        .sample_contents
        .first()
        .map(String::as_str)
        .unwrap_or("(no sample content)");
    let title: String = source.chars().take(FALLBACK_TITLE_CHARS).collect();

    LabelResponse {
        actionable: false,
        title,
        description: source.to_string(),
    }
}
