//! Error types for the connection pool

use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by connection factories and `Connection::close`
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Timed out after {0:?} waiting for a pooled connection")]
    Timeout(Duration),

    #[error("Failed to establish connection: {0}")]
    Connect(#[source] BoxError),

    #[error("Pool is closed")]
    Closed,

    #[error("Operation was cancelled before it completed")]
    Cancelled,

    #[error("Failed to export metrics: {0}")]
    Metrics(String),
}

impl PoolError {
    /// True when the pool was exhausted for the whole wait window
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Timeout(_))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
