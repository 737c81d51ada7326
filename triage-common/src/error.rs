//! Common error types for the triage pipeline

use thiserror::Error;

/// Common result type for triage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across the triage services.
///
/// Retry policy keys off [`Error::is_transient`]: transient failures are
/// retried with bounded exponential backoff, everything else fails the
/// current step immediately.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP collaborator error (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient network/storage hiccup; safe to retry
    #[error("Transient error: {0}")]
    Transient(String),

    /// Algorithmic failure inside the cluster engine; aborts one tenant's run
    #[error("Clustering failure: {0}")]
    Clustering(String),

    /// Run-level deadline exceeded
    #[error("Run deadline exceeded after {0} seconds")]
    Timeout(u64),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this failure is worth retrying.
    ///
    /// Database and HTTP errors are treated as transient: the stores and
    /// collaborators behind them are networked and hiccup under load.
    /// Clustering failures, config errors, and deadline expiry are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Http(_) | Error::Io(_) | Error::Transient(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Transient("socket reset".to_string()).is_transient());
        assert!(!Error::Clustering("degenerate matrix".to_string()).is_transient());
        assert!(!Error::Timeout(600).is_transient());
        assert!(!Error::Config("missing key".to_string()).is_transient());
    }
}
