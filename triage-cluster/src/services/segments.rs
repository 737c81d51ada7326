//! Segment source collaborator
//!
//! Read-only upstream store of behavioral segments with embeddings. Fetches
//! are bounded by a time window so the watermark keeps re-runs incremental.

use crate::models::Segment;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use triage_common::Result;

/// Seam for the segment source so the pipeline can be driven by mocks in
/// tests and by the HTTP collaborator in production.
#[async_trait]
pub trait SegmentSource: Send + Sync {
    /// Fetch one tenant's segments within `(since, until]`
    async fn fetch_segments(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Segment>>;
}

/// HTTP client for the segment source service
pub struct HttpSegmentSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSegmentSource {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl SegmentSource for HttpSegmentSource {
    async fn fetch_segments(
        &self,
        tenant_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Segment>> {
        let url = format!("{}/tenants/{}/segments", self.base_url, tenant_id);

        let segments: Vec<Segment> = self
            .client
            .get(&url)
            .query(&[
                ("since", since.to_rfc3339()),
                ("until", until.to_rfc3339()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!(
            tenant_id,
            count = segments.len(),
            "Fetched segments from source"
        );
        Ok(segments)
    }
}
