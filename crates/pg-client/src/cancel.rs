//! Out-of-band request cancellation.
//!
//! The native cancel call is synchronous and may block while it opens a side
//! channel to the server, so it must never run on the reactor thread. The
//! operation posts the blocking call onto a blocking-capable executor and
//! races it against the wait timer; whichever finishes first decides the
//! outcome, and the completion is reported exactly once (the single return
//! of the async fn).
//!
//! After a cancel the connection's protocol state is indeterminate, so the
//! connection is always closed before the outcome is reported.

use tokio::runtime::Handle;

use crate::connection::Connection;
use crate::deadline::{with_deadline, TimeConstraint};
use crate::error::{Error, Result};

/// Cancel the connection's in-flight request, blocking on the current
/// runtime's blocking executor.
///
/// See [`cancel_on`].
pub async fn cancel(conn: &mut Connection, t: TimeConstraint) -> Result<()> {
    let executor = Handle::current();
    cancel_on(conn, &executor, t).await
}

/// Cancel the connection's in-flight request, blocking on `executor`.
///
/// Obtains a detachable cancel token, dispatches the synchronous native
/// cancel on `executor` and waits for at most `t`:
///
/// - token unavailable: error context is set to "call failed due to probably
///   bad state of the connection" and [`Error::GetCancelFailed`] is returned;
/// - wait timer fires first: [`Error::OperationAborted`]; the dispatched
///   cancel keeps running detached on its executor and is discarded;
/// - the cancel call fails: its message is recorded as error context and
///   [`Error::CancelFailed`] is returned.
///
/// The connection is closed before this function returns, on every path
/// except the trivial one where it was already closed.
pub async fn cancel_on(conn: &mut Connection, executor: &Handle, t: TimeConstraint) -> Result<()> {
    let Some(token) = conn.cancel_handle() else {
        conn.set_error_context("call failed due to probably bad state of the connection");
        let context = conn.error_context().to_string();
        conn.close();
        return Err(Error::GetCancelFailed { context });
    };

    let dispatch = executor.spawn_blocking(move || token.dispatch());
    let outcome = with_deadline(t.deadline(), dispatch).await;

    match outcome {
        Err(_expired) => {
            // The blocking dispatch is not cancellable; it continues on its
            // executor and its result is discarded.
            conn.close();
            Err(Error::OperationAborted)
        }
        Ok(Ok(Ok(()))) => {
            conn.close();
            Ok(())
        }
        Ok(Ok(Err(message))) => {
            conn.set_error_context(message.clone());
            conn.close();
            Err(Error::CancelFailed(message))
        }
        Ok(Err(join_error)) => {
            conn.close();
            Err(Error::CancelFailed(join_error.to_string()))
        }
    }
}
