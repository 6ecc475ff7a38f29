//! Pool error types.

use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// No free connection became available within the timeout.
    #[error("connection acquisition timed out")]
    AcquireTimeout,

    /// Acquire refused because the wait queue is at capacity.
    #[error("pool wait queue is full")]
    QueueOverflow,

    /// Acquire attempted after pool teardown.
    #[error("pool is closed")]
    Closed,

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// The underlying connect source failed.
    #[error(transparent)]
    Source(#[from] pg_client::Error),
}

impl From<PoolError> for pg_client::Error {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::AcquireTimeout => pg_client::Error::Timeout,
            PoolError::QueueOverflow => pg_client::Error::PoolQueueOverflow,
            PoolError::Closed => pg_client::Error::PoolClosed,
            PoolError::Configuration(msg) => pg_client::Error::Connection(msg),
            PoolError::Source(inner) => inner,
        }
    }
}
