//! Pool configuration.

use std::time::Duration;

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections, idle and leased together.
    pub capacity: u32,

    /// Maximum number of queued acquisitions waiting for a free connection.
    ///
    /// `0` means "do not wait": an acquisition that finds no free connection
    /// and no open slot fails immediately with
    /// [`PoolError::QueueOverflow`](crate::PoolError::QueueOverflow).
    pub queue_capacity: u32,

    /// Bound on establishing a fresh connection within an acquisition.
    pub connect_timeout: Duration,

    /// Bound on waiting in the queue for a free connection.
    pub queue_timeout: Duration,

    /// Time an idle connection is kept before being discarded.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            queue_capacity: 128,
            connect_timeout: Duration::from_secs(10),
            queue_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// Create a pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the wait-queue capacity.
    #[must_use]
    pub fn queue_capacity(mut self, queue_capacity: u32) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the fresh-connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the queue-wait timeout.
    #[must_use]
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = timeout;
        self
    }

    /// Set the idle-connection lifetime.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), crate::error::PoolError> {
        if self.capacity == 0 {
            return Err(crate::error::PoolError::Configuration(
                "capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
