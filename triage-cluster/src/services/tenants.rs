//! Tenant eligibility collaborator
//!
//! Resolved once per coordinator sweep and passed down; never cached
//! process-wide.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use triage_common::Result;

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Current list of tenant ids eligible for a sweep
    async fn eligible_tenants(&self) -> Result<Vec<String>>;
}

/// HTTP client for the tenant directory service
pub struct HttpTenantDirectory {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct EligibleTenantsResponse {
    tenant_ids: Vec<String>,
}

impl HttpTenantDirectory {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl TenantDirectory for HttpTenantDirectory {
    async fn eligible_tenants(&self) -> Result<Vec<String>> {
        let url = format!("{}/tenants/eligible", self.base_url);

        let response: EligibleTenantsResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.tenant_ids)
    }
}
