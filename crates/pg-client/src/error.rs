//! Client error types.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during client operations.
///
/// Errors are plain values returned from the pipelines; they are never
/// unwound across a suspension point. Variants that correspond to a
/// library-level failure carry the connection's `error_context` text, and
/// server-reported failures carry the server's message, so diagnostics
/// survive the connection being released back to its owner.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Connection could not be started.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Native client reported bad status immediately after connect start.
    #[error("native connection status is bad: {0}")]
    ConnectionStatusBad(String),

    /// The connect-polling state machine terminated in failure.
    #[error("{context}: {message}")]
    ConnectPollFailed {
        /// Library-level error context.
        context: String,
        /// Native client error text.
        message: String,
    },

    /// The query could not be queued for sending.
    #[error("failed to queue query for sending: {0}")]
    SendQueryFailed(String),

    /// Outgoing data could not be flushed to the socket.
    #[error("failed to flush outgoing data: {0}")]
    FlushFailed(String),

    /// Incoming data could not be consumed from the socket.
    #[error("failed to consume server input: {0}")]
    ConsumeInputFailed(String),

    /// The server reported an error for the request.
    #[error("server error: {message}")]
    Server {
        /// Server-reported SQLSTATE, if present.
        sqlstate: Option<String>,
        /// Server-reported message text.
        message: String,
    },

    /// The server's response was not understood by the native client.
    #[error("bad server response")]
    BadResponse,

    /// The query text was empty.
    #[error("empty query")]
    EmptyQuery,

    /// A result arrived with a status the request pipeline does not accept.
    #[error("unexpected result status: {0}")]
    UnexpectedResultStatus(&'static str),

    /// The caller's result sink rejected a row.
    #[error("result processing failed: {0}")]
    ResultProcess(String),

    /// A column value could not be decoded into the requested type.
    #[error("failed to decode column value: {0}")]
    Decode(String),

    /// The type OID preload request did not cover a registered type.
    #[error("type oid request failed: {0}")]
    OidMapRequestFailed(String),

    /// A cancel handle could not be obtained from the connection.
    #[error("failed to obtain a cancel handle: {context}")]
    GetCancelFailed {
        /// Library-level error context.
        context: String,
    },

    /// The synchronous native cancel call failed.
    #[error("cancel call failed: {0}")]
    CancelFailed(String),

    /// The operation's time constraint expired.
    #[error("operation timed out")]
    Timeout,

    /// A waiting suspension was abandoned (e.g. the cancel-wait timer fired
    /// before the cancel call completed).
    #[error("operation aborted")]
    OperationAborted,

    /// The connection has been closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// IO error while waiting on the socket (wrapped in `Arc` for `Clone`).
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Acquire refused because the pool's wait queue is at capacity.
    #[error("connection pool wait queue is full")]
    PoolQueueOverflow,

    /// Acquire attempted after pool teardown.
    #[error("connection pool is closed")]
    PoolClosed,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl Error {
    /// Check if this error is transient and may succeed on retry.
    ///
    /// Transient errors include timeouts, transport-level failures, pool
    /// saturation and the server error classes that describe recoverable
    /// conditions (serialization failures, deadlocks, resource exhaustion,
    /// connection exceptions).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_)
            | Self::ConnectionStatusBad(_)
            | Self::ConnectPollFailed { .. }
            | Self::SendQueryFailed(_)
            | Self::FlushFailed(_)
            | Self::ConsumeInputFailed(_)
            | Self::Timeout
            | Self::OperationAborted
            | Self::ConnectionClosed
            | Self::PoolQueueOverflow
            | Self::Io(_) => true,
            Self::Server { sqlstate, .. } => sqlstate
                .as_deref()
                .is_some_and(Self::is_transient_sqlstate),
            _ => false,
        }
    }

    /// Check if a server SQLSTATE names a transient condition.
    #[must_use]
    pub fn is_transient_sqlstate(sqlstate: &str) -> bool {
        matches!(
            sqlstate,
            "40001" |   // serialization_failure
            "40P01" |   // deadlock_detected
            "55P03" |   // lock_not_available
            "57P03" |   // cannot_connect_now
            "57014" // query_canceled
        ) || sqlstate.starts_with("08") // connection exception class
            || sqlstate.starts_with("53") // insufficient resources class
    }

    /// Check if this is a terminal error that will never succeed on retry.
    ///
    /// Terminal errors indicate programmer error or data issues: decode
    /// failures, sink failures, empty queries and the server error classes
    /// for syntax and constraint violations.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::EmptyQuery | Self::Decode(_) | Self::ResultProcess(_) => true,
            Self::Server { sqlstate, .. } => sqlstate
                .as_deref()
                .is_some_and(|s| s.starts_with("42") || s.starts_with("23")),
            _ => false,
        }
    }

    /// Library-level error context carried by this error, if any.
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::ConnectPollFailed { context, .. } | Self::GetCancelFailed { context } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// Server-reported message carried by this error, if any.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn server_error(sqlstate: &str) -> Error {
        Error::Server {
            sqlstate: Some(sqlstate.to_string()),
            message: "test error".to_string(),
        }
    }

    #[test]
    fn test_transient_transport_errors() {
        assert!(Error::Timeout.is_transient());
        assert!(Error::OperationAborted.is_transient());
        assert!(Error::ConnectionClosed.is_transient());
        assert!(Error::PoolQueueOverflow.is_transient());
        assert!(
            Error::ConnectPollFailed {
                context: "error while connection polling".into(),
                message: "no route to host".into(),
            }
            .is_transient()
        );
    }

    #[test]
    fn test_transient_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(Error::Io(Arc::new(io)).is_transient());
    }

    #[test]
    fn test_transient_server_errors() {
        assert!(server_error("40001").is_transient()); // serialization failure
        assert!(server_error("40P01").is_transient()); // deadlock
        assert!(server_error("53300").is_transient()); // too many connections
        assert!(server_error("08006").is_transient()); // connection failure
        assert!(!server_error("42601").is_transient()); // syntax error
    }

    #[test]
    fn test_terminal_errors() {
        assert!(Error::EmptyQuery.is_terminal());
        assert!(Error::Decode("bad int4 length".into()).is_terminal());
        assert!(server_error("42601").is_terminal()); // syntax error
        assert!(server_error("23505").is_terminal()); // unique violation
        assert!(!server_error("40001").is_terminal());
        assert!(!Error::Timeout.is_terminal());
    }

    #[test]
    fn test_context_accessor() {
        let err = Error::GetCancelFailed {
            context: "call failed due to probably bad state of the connection".into(),
        };
        assert_eq!(
            err.context(),
            Some("call failed due to probably bad state of the connection")
        );
        assert_eq!(Error::Timeout.context(), None);
    }

    #[test]
    fn test_server_message_accessor() {
        let err = server_error("42601");
        assert_eq!(err.server_message(), Some("test error"));
        assert_eq!(Error::BadResponse.server_message(), None);
    }

    #[test]
    fn test_errors_are_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<Error>();
    }
}
