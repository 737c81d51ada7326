//! Utility modules for triage-cluster

pub mod retry;

pub use retry::retry_step;
