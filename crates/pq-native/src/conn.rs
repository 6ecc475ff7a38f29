//! Native connection handle.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::os::unix::io::RawFd;
use std::ptr::NonNull;

use crate::cancel::PqCancel;
use crate::result::PqResult;

/// Outcome of one round of the native connect-polling state machine.
///
/// The native `PGRES_POLLING_ACTIVE` value is an obsolete artifact that the
/// library never returns in non-blocking mode; it folds into [`Failed`].
///
/// [`Failed`]: PollingStatus::Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStatus {
    /// The connection is established.
    Ok,
    /// The caller must wait for the socket to become readable, then re-poll.
    Reading,
    /// The caller must wait for the socket to become writable, then re-poll.
    Writing,
    /// The connect attempt failed.
    Failed,
}

/// Outcome of flushing buffered outgoing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// All queued data has been written to the socket.
    Done,
    /// The socket would block; wait for writability and flush again.
    Pending,
}

/// An owned native connection handle.
///
/// The handle may be moved between threads but must only ever be used from
/// one thread at a time, which the owning `Connection` guarantees by being
/// `Send` but not `Sync`.
pub struct PqConnection {
    conn: NonNull<pq_sys::PGconn>,
}

// libpq connection objects have no thread affinity; only concurrent use is
// forbidden, and exclusive ownership rules that out.
unsafe impl Send for PqConnection {}

impl PqConnection {
    /// Begin a non-blocking connection attempt.
    ///
    /// The connection string is passed to the native client opaquely. The
    /// returned handle must be driven to completion with
    /// [`connect_poll`](Self::connect_poll); check
    /// [`status_bad`](Self::status_bad) first for immediate failures.
    pub fn start(conninfo: &str) -> Result<Self, String> {
        let conninfo = CString::new(conninfo)
            .map_err(|_| String::from("connection string contains a NUL byte"))?;
        let conn = unsafe { pq_sys::PQconnectStart(conninfo.as_ptr()) };
        NonNull::new(conn)
            .map(|conn| Self { conn })
            .ok_or_else(|| String::from("out of memory allocating a native connection"))
    }

    /// Whether the native client reports the connection as bad.
    pub fn status_bad(&self) -> bool {
        unsafe { pq_sys::PQstatus(self.conn.as_ptr()) == pq_sys::ConnStatusType::CONNECTION_BAD }
    }

    /// Advance the connect state machine one step.
    pub fn connect_poll(&mut self) -> PollingStatus {
        let status = unsafe { pq_sys::PQconnectPoll(self.conn.as_ptr()) };
        use pq_sys::PostgresPollingStatusType as T;
        if status == T::PGRES_POLLING_OK {
            PollingStatus::Ok
        } else if status == T::PGRES_POLLING_READING {
            PollingStatus::Reading
        } else if status == T::PGRES_POLLING_WRITING {
            PollingStatus::Writing
        } else {
            PollingStatus::Failed
        }
    }

    /// The socket descriptor backing the connection, if one is open.
    ///
    /// The descriptor is owned by the native client and may change between
    /// connect-poll rounds while the client walks the host list.
    pub fn socket(&self) -> Option<RawFd> {
        let fd = unsafe { pq_sys::PQsocket(self.conn.as_ptr()) };
        (fd >= 0).then_some(fd as RawFd)
    }

    /// Switch the connection into non-blocking send mode.
    pub fn set_nonblocking(&mut self) -> Result<(), String> {
        let rc = unsafe { pq_sys::PQsetnonblocking(self.conn.as_ptr(), 1) };
        if rc == 0 {
            Ok(())
        } else {
            Err(self.error_message())
        }
    }

    /// Queue a parameterized query for sending.
    ///
    /// Parameters are pre-encoded binary values (`None` encodes SQL NULL) and
    /// results are requested in binary format. Queuing succeeds or fails as a
    /// whole; on success the caller must [`flush`](Self::flush) until
    /// [`FlushStatus::Done`].
    pub fn send_query_params(
        &mut self,
        text: &str,
        params: &[Option<Vec<u8>>],
        param_oids: &[u32],
    ) -> Result<(), String> {
        let text =
            CString::new(text).map_err(|_| String::from("query text contains a NUL byte"))?;

        let mut values: Vec<*const c_char> = Vec::with_capacity(params.len());
        let mut lengths: Vec<c_int> = Vec::with_capacity(params.len());
        let mut formats: Vec<c_int> = Vec::with_capacity(params.len());
        for param in params {
            match param {
                Some(bytes) => {
                    values.push(bytes.as_ptr().cast());
                    lengths.push(bytes.len() as c_int);
                }
                None => {
                    values.push(std::ptr::null());
                    lengths.push(0);
                }
            }
            formats.push(1);
        }

        let oids_ptr = if param_oids.is_empty() {
            std::ptr::null()
        } else {
            param_oids.as_ptr() as *const pq_sys::Oid
        };
        let (values_ptr, lengths_ptr, formats_ptr) = if params.is_empty() {
            (std::ptr::null(), std::ptr::null(), std::ptr::null())
        } else {
            (values.as_ptr(), lengths.as_ptr(), formats.as_ptr())
        };

        let rc = unsafe {
            pq_sys::PQsendQueryParams(
                self.conn.as_ptr(),
                text.as_ptr(),
                params.len() as c_int,
                oids_ptr,
                values_ptr,
                lengths_ptr,
                formats_ptr,
                1,
            )
        };
        if rc == 1 {
            Ok(())
        } else {
            Err(self.error_message())
        }
    }

    /// Attempt to push queued outgoing data onto the socket.
    pub fn flush(&mut self) -> Result<FlushStatus, String> {
        match unsafe { pq_sys::PQflush(self.conn.as_ptr()) } {
            0 => Ok(FlushStatus::Done),
            1 => Ok(FlushStatus::Pending),
            _ => Err(self.error_message()),
        }
    }

    /// Read whatever input is currently available on the socket.
    pub fn consume_input(&mut self) -> Result<(), String> {
        let rc = unsafe { pq_sys::PQconsumeInput(self.conn.as_ptr()) };
        if rc == 1 {
            Ok(())
        } else {
            Err(self.error_message())
        }
    }

    /// Whether [`get_result`](Self::get_result) would block.
    pub fn is_busy(&self) -> bool {
        unsafe { pq_sys::PQisBusy(self.conn.as_ptr()) == 1 }
    }

    /// Take the next available result, or `None` when the request is drained.
    pub fn get_result(&mut self) -> Option<PqResult> {
        let res = unsafe { pq_sys::PQgetResult(self.conn.as_ptr()) };
        NonNull::new(res).map(|res| unsafe { PqResult::from_raw(res) })
    }

    /// The most recent native error text for this connection.
    pub fn error_message(&self) -> String {
        unsafe {
            let msg = pq_sys::PQerrorMessage(self.conn.as_ptr());
            if msg.is_null() {
                String::new()
            } else {
                CStr::from_ptr(msg).to_string_lossy().trim_end().to_string()
            }
        }
    }

    /// Obtain a detachable cancel token for the current request.
    ///
    /// Returns `None` when the connection is in a state that cannot be
    /// cancelled (e.g. never established).
    pub fn cancel_handle(&self) -> Option<PqCancel> {
        unsafe { PqCancel::from_conn(self.conn.as_ptr()) }
    }
}

impl Drop for PqConnection {
    fn drop(&mut self) {
        unsafe { pq_sys::PQfinish(self.conn.as_ptr()) };
    }
}

impl std::fmt::Debug for PqConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PqConnection")
            .field("socket", &self.socket())
            .field("status_bad", &self.status_bad())
            .finish()
    }
}
