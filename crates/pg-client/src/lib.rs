//! # pg-client
//!
//! High-level async PostgreSQL client core built on the native libpq library.
//!
//! This is the primary API surface of the rust-pg-driver project. The native
//! client does the wire protocol; this crate composes non-blocking socket
//! polling, timeouts and cancellation on top of it:
//!
//! - **Connect pipeline**: drives the native connect-polling state machine on
//!   the tokio reactor, bounded by a [`TimeConstraint`].
//! - **Request pipeline**: sends a parameterized [`Query`], streams result
//!   rows into a caller-supplied sink, and cancels the server-side query
//!   out-of-band when the deadline fires.
//! - **Cancel operation**: isolates the synchronous native cancel call onto a
//!   blocking-capable executor so the reactor thread never blocks.
//! - **Failover framework**: re-invokes an operation with successor contexts
//!   (retries, alternate providers) supplied by a pluggable strategy.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pg_client::{request, ConnectionInfo, Query, RowBuffer, TimeConstraint};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pg_client::Error> {
//!     let info = ConnectionInfo::new("host=localhost dbname=test");
//!
//!     let mut rows = RowBuffer::new();
//!     request(
//!         &info,
//!         &Query::new("SELECT 1"),
//!         TimeConstraint::In(Duration::from_secs(1)),
//!         &mut rows,
//!     )
//!     .await?;
//!
//!     assert_eq!(rows.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Threading model
//!
//! A [`Connection`] is affine to the tokio runtime that created it: its
//! socket is registered with that runtime's reactor for its whole lifetime.
//! Connections are `Send` (they may be handed between tasks) but never used
//! concurrently; the native protocol is strictly serial per connection.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cancel;
pub mod connection;
pub mod deadline;
pub mod error;
pub mod failover;
pub mod oid_map;
pub mod provider;
pub mod query;
pub mod request;
pub mod retry;
pub mod row;

// Re-export commonly used types
pub use cancel::{cancel, cancel_on};
pub use connection::{Connection, ConnectionStatus};
pub use deadline::TimeConstraint;
pub use error::{Error, Result};
pub use failover::{FailoverStrategy, FailoverTry, FallbackStrategy, TryContext};
pub use oid_map::OidMap;
pub use provider::{ConnectionHandle, ConnectionInfo, ConnectionProvider};
pub use query::Query;
pub use request::{execute, request, request_on};
pub use retry::RetryStrategy;
pub use row::{FromRow, FromSql, Row, RowBuffer, RowSink};
