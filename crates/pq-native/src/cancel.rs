//! Detachable cancel token.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::ptr::NonNull;

/// A detachable, synchronous cancel token for an in-flight request.
///
/// The token stays valid independently of the connection it was obtained
/// from and may be dispatched from another thread. [`dispatch`] speaks to the
/// server over a short-lived side channel and **blocks** until the server
/// answers or the attempt fails; never call it on a reactor thread.
///
/// [`dispatch`]: PqCancel::dispatch
pub struct PqCancel {
    cancel: NonNull<pq_sys::PGcancel>,
}

// The native cancel object is explicitly documented as usable from a thread
// other than the one driving the connection.
unsafe impl Send for PqCancel {}

impl PqCancel {
    /// Obtain a cancel token from a raw native connection.
    ///
    /// # Safety
    ///
    /// `conn` must be a valid native connection pointer.
    pub(crate) unsafe fn from_conn(conn: *mut pq_sys::PGconn) -> Option<Self> {
        NonNull::new(pq_sys::PQgetCancel(conn)).map(|cancel| Self { cancel })
    }

    /// Ask the server to abandon the current request. Blocking.
    ///
    /// Success means the request was delivered, not that the query was
    /// interrupted; the server may have finished the query already.
    pub fn dispatch(&self) -> Result<(), String> {
        let mut errbuf = [0 as c_char; 256];
        let rc = unsafe {
            pq_sys::PQcancel(
                self.cancel.as_ptr(),
                errbuf.as_mut_ptr(),
                errbuf.len() as c_int,
            )
        };
        if rc == 1 {
            Ok(())
        } else {
            let msg = unsafe { CStr::from_ptr(errbuf.as_ptr()) };
            Err(msg.to_string_lossy().trim_end().to_string())
        }
    }
}

impl Drop for PqCancel {
    fn drop(&mut self) {
        unsafe { pq_sys::PQfreeCancel(self.cancel.as_ptr()) };
    }
}

impl std::fmt::Debug for PqCancel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PqCancel").finish()
    }
}
