//! Configuration loading for the triage services
//!
//! Resolution priority, highest first:
//! 1. Environment variables (`TRIAGE_*`)
//! 2. TOML config file
//! 3. Compiled defaults
//!
//! Every empirically-tuned constant of the clustering pipeline lives here so
//! operators can adjust thresholds without a rebuild.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable parameters for the clustering pipeline.
///
/// Defaults reflect current production tuning; none of these values is a
/// hard contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// Below this segment count the agglomerative strategy is used
    pub agglomerative_threshold: usize,
    /// Cosine-distance ceiling for merging / finalizing clusters
    pub distance_threshold: f32,
    /// Multiplier for K estimation: K = max(2, round(k * log10(pool)))
    pub k_multiplier: f64,
    /// Iteration cap for the bisecting K-means loop
    pub max_kmeans_iterations: usize,
    /// Pool sizes below this terminate the K-means loop
    pub min_cluster_size: usize,
    /// At or above this segment count, noise is dropped instead of
    /// becoming singleton clusters
    pub noise_discard_threshold: usize,
    /// Cosine-distance ceiling for matching a cluster to an existing task
    pub match_threshold: f32,
    /// How many member contents are sampled per labeling request
    pub label_sample_size: usize,
    /// Cap on in-flight labeling requests per run
    pub label_concurrency: usize,
    /// Runs with fewer fetched segments short-circuit to Done
    pub min_segments_to_cluster: usize,
    /// Fetch window when a tenant has no watermark yet (hours)
    pub lookback_hours: i64,
    /// Cap on concurrently in-flight tenant runs per sweep
    pub max_concurrent_tenants: usize,
    /// Run-level deadline (seconds)
    pub run_timeout_secs: u64,
    /// Bounded attempts per pipeline step
    pub step_max_attempts: u32,
    /// Initial backoff between step attempts (milliseconds, doubled per retry)
    pub step_backoff_ms: u64,
    /// Safety-net TTL for centroid cache entries (seconds)
    pub centroid_cache_ttl_secs: u64,
    /// Upper bound of the priority curve
    pub priority_cap: f64,
    /// Shape constant of the priority curve (larger = slower saturation)
    pub priority_shape: f64,
    /// Expected embedding dimensionality; when set, fetched segments are
    /// validated against it before clustering
    pub embedding_dim: Option<usize>,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            agglomerative_threshold: 50,
            distance_threshold: 0.4,
            k_multiplier: 10.0,
            max_kmeans_iterations: 10,
            min_cluster_size: 2,
            noise_discard_threshold: 100,
            match_threshold: 0.3,
            label_sample_size: 5,
            label_concurrency: 8,
            min_segments_to_cluster: 3,
            lookback_hours: 24,
            max_concurrent_tenants: 4,
            run_timeout_secs: 600,
            step_max_attempts: 3,
            step_backoff_ms: 250,
            centroid_cache_ttl_secs: 900,
            priority_cap: 100.0,
            priority_shape: 3.0,
            embedding_dim: None,
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// SQLite database path (converted to a `sqlite://` URL at pool init)
    pub database_path: String,
    /// Segment source collaborator base URL
    pub segment_api_url: String,
    /// Labeling collaborator base URL
    pub labeling_api_url: String,
    /// Tenant eligibility collaborator base URL
    pub tenant_api_url: String,
    /// Timeout for individual collaborator HTTP calls (seconds)
    pub http_timeout_secs: u64,
    /// Minutes between scheduled sweeps
    pub sweep_interval_mins: u64,
    /// Pipeline tunables
    pub params: PipelineParams,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            database_path: "triage.db".to_string(),
            segment_api_url: "http://127.0.0.1:8601".to_string(),
            labeling_api_url: "http://127.0.0.1:8602".to_string(),
            tenant_api_url: "http://127.0.0.1:8603".to_string(),
            http_timeout_secs: 30,
            sweep_interval_mins: 30,
            params: PipelineParams::default(),
        }
    }
}

impl TriageConfig {
    /// Load configuration from an optional TOML file, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(p)
                    .map_err(|e| Error::Config(format!("Read config failed: {}", e)))?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Parse config failed: {}", e)))?
            }
            Some(p) => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            None => TriageConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `TRIAGE_*` environment overrides on top of file/default values
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TRIAGE_DATABASE_PATH") {
            self.database_path = v;
        }
        if let Ok(v) = std::env::var("TRIAGE_SEGMENT_API_URL") {
            self.segment_api_url = v;
        }
        if let Ok(v) = std::env::var("TRIAGE_LABELING_API_URL") {
            self.labeling_api_url = v;
        }
        if let Ok(v) = std::env::var("TRIAGE_TENANT_API_URL") {
            self.tenant_api_url = v;
        }
        if let Some(v) = parse_env("TRIAGE_MATCH_THRESHOLD") {
            self.params.match_threshold = v;
        }
        if let Some(v) = parse_env("TRIAGE_DISTANCE_THRESHOLD") {
            self.params.distance_threshold = v;
        }
        if let Some(v) = parse_env("TRIAGE_MAX_CONCURRENT_TENANTS") {
            self.params.max_concurrent_tenants = v;
        }
        if let Some(v) = parse_env("TRIAGE_MIN_SEGMENTS_TO_CLUSTER") {
            self.params.min_segments_to_cluster = v;
        }
    }

    /// Reject configurations the pipeline cannot run with
    fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.params.match_threshold) {
            return Err(Error::Config(format!(
                "match_threshold must be a cosine distance in [0, 2], got {}",
                self.params.match_threshold
            )));
        }
        if !(0.0..=2.0).contains(&self.params.distance_threshold) {
            return Err(Error::Config(format!(
                "distance_threshold must be a cosine distance in [0, 2], got {}",
                self.params.distance_threshold
            )));
        }
        if self.params.max_concurrent_tenants == 0 {
            return Err(Error::Config(
                "max_concurrent_tenants must be at least 1".to_string(),
            ));
        }
        if self.params.step_max_attempts == 0 {
            return Err(Error::Config(
                "step_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.params.min_cluster_size == 0 {
            return Err(Error::Config(
                "min_cluster_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
                None
            }
        },
        Err(_) => None,
    }
}
