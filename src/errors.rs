//! Error types for the pool

use thiserror::Error;

/// Errors surfaced by pool setup and metrics export.
///
/// Lending and returning resources never fails; stale entries are absorbed
/// internally and unknown items are ignored on release.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("No tokio runtime is available to schedule the idle timer")]
    NoRuntime,

    #[cfg(feature = "metrics")]
    #[error("Failed to export metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type PoolResult<T> = Result<T, PoolError>;
