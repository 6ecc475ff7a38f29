//! Connection object and the async connect pipeline.

use std::os::unix::io::{AsRawFd, RawFd};

use pq_native::{PollingStatus, PqCancel, PqConnection};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use crate::deadline::{with_deadline, TimeConstraint};
use crate::error::{Error, Result};
use crate::oid_map::OidMap;

/// Runtime status of a connection.
///
/// `Bad` is sticky: any error during a request transitions the connection to
/// `Bad`, and owners (the pool in particular) discard it rather than reuse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No native connection is attached.
    Disconnected,
    /// The connect state machine is in progress.
    Connecting,
    /// Connected and ready for a request.
    Idle,
    /// A request is in flight.
    Busy,
    /// The connection failed and must not be reused.
    Bad,
}

impl ConnectionStatus {
    /// Check if the connection may serve a request.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Check if the connection should be discarded by its owner.
    #[must_use]
    pub fn should_discard(&self) -> bool {
        matches!(self, Self::Bad | Self::Disconnected)
    }
}

/// Socket descriptor owned by the native client, registered with the reactor.
///
/// The reactor registration only borrows the descriptor; closing it remains
/// the native client's job.
struct SocketFd(RawFd);

impl AsRawFd for SocketFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

struct Io {
    native: PqConnection,
    socket: AsyncFd<SocketFd>,
}

/// One database connection.
///
/// Owns the native handle, its reactor-registered socket, the populated
/// [`OidMap`] and a mutable error-context string describing the most recent
/// library-level failure. A connection is owned by exactly one holder at any
/// instant and is affine to the runtime that created it.
pub struct Connection {
    io: Option<Io>,
    status: ConnectionStatus,
    error_context: String,
    oid_map: OidMap,
}

impl Connection {
    /// Establish a connection, bounded by `t`.
    ///
    /// Drives the native connect-polling state machine on the reactor. When
    /// `registered_types` is non-empty the OID map is populated with an
    /// internal request against the fresh connection before it is handed
    /// back. On expiry of `t` the socket is closed and [`Error::Timeout`] is
    /// returned.
    pub(crate) async fn establish(
        conninfo: &str,
        t: TimeConstraint,
        registered_types: &[String],
    ) -> Result<Connection> {
        let deadline = t.deadline();
        with_deadline(deadline, Self::drive_connect(conninfo, registered_types))
            .await
            .map_err(|_| Error::Timeout)?
    }

    async fn drive_connect(conninfo: &str, registered_types: &[String]) -> Result<Connection> {
        let native = PqConnection::start(conninfo).map_err(Error::Connection)?;
        if native.status_bad() {
            return Err(Error::ConnectionStatusBad(native.error_message()));
        }

        let mut conn = Connection::from_native(native)?;
        loop {
            match conn.native_mut()?.connect_poll() {
                PollingStatus::Ok => break,
                PollingStatus::Writing => conn.writable().await?,
                PollingStatus::Reading => conn.readable().await?,
                PollingStatus::Failed => {
                    if conn.error_context.is_empty() {
                        conn.set_error_context("error while connection polling");
                    }
                    let context = conn.error_context.clone();
                    let message = conn.server_message();
                    conn.mark_bad();
                    return Err(Error::ConnectPollFailed { context, message });
                }
            }
            // The native client may move to another socket while it walks
            // the host list; keep the reactor registration in step.
            conn.refresh_socket()?;
        }

        conn.native_mut()?.set_nonblocking().map_err(Error::Connection)?;
        conn.status = ConnectionStatus::Idle;
        tracing::debug!("connection established");

        if !registered_types.is_empty() {
            crate::oid_map::populate(&mut conn, registered_types).await?;
        }
        Ok(conn)
    }

    fn from_native(native: PqConnection) -> Result<Connection> {
        let fd = native
            .socket()
            .ok_or_else(|| Error::Connection(String::from("native connection has no socket")))?;
        let socket = AsyncFd::with_interest(SocketFd(fd), Interest::READABLE | Interest::WRITABLE)?;
        Ok(Connection {
            io: Some(Io { native, socket }),
            status: ConnectionStatus::Connecting,
            error_context: String::new(),
            oid_map: OidMap::new(),
        })
    }

    fn refresh_socket(&mut self) -> Result<()> {
        let io = self.io.as_mut().ok_or(Error::ConnectionClosed)?;
        let current = io.native.socket();
        if current != Some(io.socket.get_ref().0) {
            let fd = current.ok_or_else(|| {
                Error::Connection(String::from("native connection lost its socket"))
            })?;
            io.socket =
                AsyncFd::with_interest(SocketFd(fd), Interest::READABLE | Interest::WRITABLE)?;
        }
        Ok(())
    }

    /// Suspend until the socket is readable.
    pub(crate) async fn readable(&mut self) -> Result<()> {
        let io = self.io.as_mut().ok_or(Error::ConnectionClosed)?;
        let mut guard = io.socket.readable_mut().await?;
        guard.clear_ready();
        Ok(())
    }

    /// Suspend until the socket is writable.
    pub(crate) async fn writable(&mut self) -> Result<()> {
        let io = self.io.as_mut().ok_or(Error::ConnectionClosed)?;
        let mut guard = io.socket.writable_mut().await?;
        guard.clear_ready();
        Ok(())
    }

    pub(crate) fn native_mut(&mut self) -> Result<&mut PqConnection> {
        self.io
            .as_mut()
            .map(|io| &mut io.native)
            .ok_or(Error::ConnectionClosed)
    }

    /// Current status of the connection.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    /// Transition to the sticky `Bad` state.
    pub(crate) fn mark_bad(&mut self) {
        self.status = ConnectionStatus::Bad;
    }

    /// The most recent library-level failure description.
    #[must_use]
    pub fn error_context(&self) -> &str {
        &self.error_context
    }

    /// Replace the library-level failure description.
    pub fn set_error_context(&mut self, context: impl Into<String>) {
        self.error_context = context.into();
    }

    /// The native client's most recent error text, if the connection is open.
    #[must_use]
    pub fn server_message(&self) -> String {
        self.io
            .as_ref()
            .map(|io| io.native.error_message())
            .unwrap_or_default()
    }

    /// Obtain a detachable cancel token for the current request.
    pub(crate) fn cancel_handle(&self) -> Option<PqCancel> {
        self.io.as_ref().and_then(|io| io.native.cancel_handle())
    }

    /// Whether a native connection is attached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.io.is_some()
    }

    /// Whether the connection is open and usable at the transport level.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        match (&self.io, self.status) {
            (Some(io), ConnectionStatus::Idle) => !io.native.status_bad(),
            _ => false,
        }
    }

    /// Close the native connection.
    ///
    /// Removes the reactor registration and finishes the native handle. A
    /// `Bad` connection stays `Bad`; anything else becomes `Disconnected`.
    pub fn close(&mut self) {
        if self.io.take().is_some() {
            tracing::debug!("connection closed");
        }
        if self.status != ConnectionStatus::Bad {
            self.status = ConnectionStatus::Disconnected;
        }
    }

    /// Registered server type OIDs for this connection.
    #[must_use]
    pub fn oid_map(&self) -> &OidMap {
        &self.oid_map
    }

    pub(crate) fn oid_map_mut(&mut self) -> &mut OidMap {
        &mut self.oid_map
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("status", &self.status)
            .field("open", &self.is_open())
            .field("error_context", &self.error_context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Connection>();
    }

    #[test]
    fn test_status_predicates() {
        assert!(ConnectionStatus::Idle.is_usable());
        assert!(!ConnectionStatus::Busy.is_usable());
        assert!(ConnectionStatus::Bad.should_discard());
        assert!(ConnectionStatus::Disconnected.should_discard());
        assert!(!ConnectionStatus::Idle.should_discard());
    }
}
