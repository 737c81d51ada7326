//! triage-cluster library interface
//!
//! Exposes the clustering pipeline for integration testing: the cluster
//! engine, per-step services, the per-tenant pipeline run, and the sweep
//! coordinator.

pub mod coordinator;
pub mod db;
pub mod engine;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod util;

pub use coordinator::{Coordinator, SweepSummary};
pub use pipeline::Pipeline;
