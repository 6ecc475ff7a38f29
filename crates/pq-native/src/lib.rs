//! # pq-native
//!
//! Thin, safe wrappers over the native libpq client library (via `pq-sys`).
//!
//! libpq is fundamentally a blocking C library with an opt-in non-blocking
//! mode driven by explicit polling calls. This crate exposes exactly the
//! subset of that surface the async driver needs:
//!
//! - connect-start / connect-poll for the non-blocking connect state machine
//! - send / flush / consume-input / is-busy / get-result for the request cycle
//! - the socket descriptor, so a reactor can wait for readiness
//! - a detachable cancel token whose dispatch is synchronous by nature
//!
//! Scheduling is the caller's concern: nothing in this crate suspends or
//! blocks except [`PqCancel::dispatch`], which is documented as blocking and
//! must be run on an executor that tolerates it.
//!
//! All `unsafe` of the driver lives here; the crates above deny it.

#![warn(missing_docs)]

mod cancel;
mod conn;
mod result;

pub use cancel::PqCancel;
pub use conn::{FlushStatus, PollingStatus, PqConnection};
pub use result::{ExecStatus, PqResult};
