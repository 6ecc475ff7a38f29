//! Async request pipeline.
//!
//! Phases: acquire connection, send query, consume input rounds, publish
//! results, release. Between consume rounds the pipeline yields by awaiting
//! socket readability; each resumption drains all currently-available input.
//!
//! Guarantees:
//!
//! - **At-most-once send**: the query is queued with the native client
//!   exactly once; a failure before the first flush acknowledgment surfaces
//!   as [`Error::SendQueryFailed`] / [`Error::FlushFailed`].
//! - **Reliable cancellation on deadline**: expiry of the time constraint
//!   cancels the pending socket wait, dispatches an out-of-band cancel to the
//!   server, marks the connection bad and reports [`Error::Timeout`] (or
//!   [`Error::OperationAborted`] when the cancel wait itself expires).
//! - **Result streaming**: rows are appended to the caller's sink as results
//!   are drained; the sink's `append` is synchronous relative to the
//!   pipeline.

use std::time::Duration;

use bytes::Bytes;
use pq_native::{ExecStatus, FlushStatus, PqResult};

use crate::cancel;
use crate::connection::{Connection, ConnectionStatus};
use crate::deadline::{with_deadline, TimeConstraint};
use crate::error::{Error, Result};
use crate::provider::{ConnectionHandle, ConnectionProvider};
use crate::query::Query;
use crate::row::{Row, RowSink};

/// How long the deadline path waits for the out-of-band cancel to complete.
const CANCEL_WAIT: Duration = Duration::from_secs(1);

/// Run a query through a connection provider.
///
/// Acquires a connection, runs [`request_on`] and releases the connection on
/// every exit path (release happens when the provider's handle drops; a
/// connection marked bad is discarded by its owner). The time constraint is
/// resolved to an absolute deadline once and covers acquisition and the
/// request itself.
pub async fn request<P, S>(
    provider: &P,
    query: &Query,
    t: TimeConstraint,
    sink: &mut S,
) -> Result<()>
where
    P: ConnectionProvider,
    S: RowSink,
{
    let t = t.resolve();
    let mut handle = provider.get(t).await?;
    request_on(handle.conn_mut(), query, t, sink).await
}

/// Run a query on an already-held connection.
///
/// See [`request`] for the semantics; this is the entry point for callers
/// that manage connection reuse themselves.
pub async fn request_on<S: RowSink>(
    conn: &mut Connection,
    query: &Query,
    t: TimeConstraint,
    sink: &mut S,
) -> Result<()> {
    let deadline = t.deadline();
    let outcome = with_deadline(deadline, drive(conn, query, sink)).await;
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            conn.mark_bad();
            Err(e)
        }
        Err(_expired) => {
            conn.mark_bad();
            tracing::debug!("request deadline expired, dispatching out-of-band cancel");
            match cancel::cancel(conn, TimeConstraint::In(CANCEL_WAIT)).await {
                Err(Error::OperationAborted) => Err(Error::OperationAborted),
                _ => Err(Error::Timeout),
            }
        }
    }
}

/// Run a query and discard any result rows.
///
/// The command-style counterpart of [`request`], for statements whose rows
/// (if any) are of no interest.
pub async fn execute<P: ConnectionProvider>(
    provider: &P,
    query: &Query,
    t: TimeConstraint,
) -> Result<()> {
    struct Discard;
    impl RowSink for Discard {
        fn append(&mut self, _row: Row) -> Result<()> {
            Ok(())
        }
    }
    request(provider, query, t, &mut Discard).await
}

/// The unbounded request cycle; callers wrap it in a deadline.
pub(crate) async fn drive<S: RowSink>(
    conn: &mut Connection,
    query: &Query,
    sink: &mut S,
) -> Result<()> {
    conn.set_status(ConnectionStatus::Busy);

    {
        let native = conn.native_mut()?;
        native.set_nonblocking().map_err(Error::SendQueryFailed)?;
        native
            .send_query_params(query.text(), query.params(), query.param_oids())
            .map_err(Error::SendQueryFailed)?;
    }

    loop {
        match conn.native_mut()?.flush().map_err(Error::FlushFailed)? {
            FlushStatus::Done => break,
            FlushStatus::Pending => conn.writable().await?,
        }
    }

    // Drain every result of the request. After a server error the protocol
    // still delivers trailing results; they must be consumed before the
    // error is reported, or the connection desynchronizes.
    let mut first_error: Option<Error> = None;
    loop {
        while conn.native_mut()?.is_busy() {
            conn.readable().await?;
            conn.native_mut()?
                .consume_input()
                .map_err(Error::ConsumeInputFailed)?;
        }
        let Some(result) = conn.native_mut()?.get_result() else {
            break;
        };
        if first_error.is_none() {
            if let Err(e) = absorb_result(conn, &result, sink) {
                first_error = Some(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    conn.set_status(ConnectionStatus::Idle);
    Ok(())
}

fn absorb_result<S: RowSink>(conn: &mut Connection, result: &PqResult, sink: &mut S) -> Result<()> {
    match result.status() {
        ExecStatus::TuplesOk | ExecStatus::SingleTuple => {
            let nfields = result.nfields();
            for row_idx in 0..result.ntuples() {
                let cells = (0..nfields)
                    .map(|col| result.value(row_idx, col).map(Bytes::copy_from_slice))
                    .collect();
                if let Err(e) = sink.append(Row::from_cells(cells)) {
                    conn.set_error_context(e.to_string());
                    return Err(Error::ResultProcess(e.to_string()));
                }
            }
            Ok(())
        }
        ExecStatus::CommandOk => Ok(()),
        ExecStatus::EmptyQuery => Err(Error::EmptyQuery),
        ExecStatus::BadResponse => Err(Error::BadResponse),
        ExecStatus::FatalError => Err(Error::Server {
            sqlstate: result.sqlstate(),
            message: result.error_message(),
        }),
        other => {
            conn.set_error_context(other.name());
            Err(Error::UnexpectedResultStatus(other.name()))
        }
    }
}
