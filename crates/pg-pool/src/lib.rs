//! # pg-driver-pool
//!
//! Bounded connection pool for the async PostgreSQL driver.
//!
//! The pool leases reusable connections up to a fixed capacity and queues
//! excess acquisitions in a bounded FIFO wait queue. Connections returning
//! from a lease are liveness-checked; bad connections are discarded and
//! their slot is offered to the next waiter.
//!
//! The pool is generic over a [`ConnectSource`], the factory that
//! establishes fresh connections. `pg_client::ConnectionInfo` is the
//! production source; tests substitute a mock to exercise the pool's
//! invariants without a server.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pg_client::{request, ConnectionInfo, Query, RowBuffer, TimeConstraint};
//! use pg_driver_pool::{Pool, PoolConfig};
//! use std::time::Duration;
//!
//! let info = ConnectionInfo::new("host=localhost dbname=test");
//! let pool = Pool::new(info, PoolConfig::new().capacity(4))?;
//!
//! let provider = pool.provider();
//! let mut rows = RowBuffer::new();
//! request(
//!     &provider,
//!     &Query::new("SELECT 1"),
//!     TimeConstraint::In(Duration::from_secs(1)),
//!     &mut rows,
//! )
//! .await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use pool::{ConnectSource, PgPool, Pool, PoolProvider, PoolStatus, PooledConnection, PooledItem};
