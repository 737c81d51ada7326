//! # Triage Common Library
//!
//! Shared code for the triage services including:
//! - Error taxonomy and result type
//! - Configuration loading (TOML file + environment overrides)
//! - Tunable pipeline parameters with compiled defaults

pub mod config;
pub mod error;

pub use config::{PipelineParams, TriageConfig};
pub use error::{Error, Result};
