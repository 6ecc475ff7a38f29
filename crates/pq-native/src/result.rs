//! Native result handle.

use std::ffi::CStr;
use std::os::raw::c_int;
use std::ptr::NonNull;

// PG_DIAG_SQLSTATE from postgres_ext.h.
const DIAG_SQLSTATE: c_int = b'C' as c_int;

/// Execution status of a native result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// The query string was empty.
    EmptyQuery,
    /// A command that returns no rows completed successfully.
    CommandOk,
    /// A query returned rows; all of them are in this result.
    TuplesOk,
    /// A single row of a row-by-row retrieval.
    SingleTuple,
    /// The server's response was not understood.
    BadResponse,
    /// A notice or warning; the request continues.
    NonfatalError,
    /// The request failed; see the attached error message.
    FatalError,
    /// Copy-out transfer started.
    CopyOut,
    /// Copy-in transfer started.
    CopyIn,
    /// Copy-both transfer started.
    CopyBoth,
    /// A status value this adapter does not model.
    Unknown,
}

impl ExecStatus {
    /// Stable lowercase name, used for error context.
    pub fn name(self) -> &'static str {
        match self {
            ExecStatus::EmptyQuery => "empty_query",
            ExecStatus::CommandOk => "command_ok",
            ExecStatus::TuplesOk => "tuples_ok",
            ExecStatus::SingleTuple => "single_tuple",
            ExecStatus::BadResponse => "bad_response",
            ExecStatus::NonfatalError => "nonfatal_error",
            ExecStatus::FatalError => "fatal_error",
            ExecStatus::CopyOut => "copy_out",
            ExecStatus::CopyIn => "copy_in",
            ExecStatus::CopyBoth => "copy_both",
            ExecStatus::Unknown => "unknown",
        }
    }
}

/// An owned native result set.
pub struct PqResult {
    res: NonNull<pq_sys::PGresult>,
}

unsafe impl Send for PqResult {}

impl PqResult {
    /// Take ownership of a raw native result.
    ///
    /// # Safety
    ///
    /// `res` must be a valid pointer previously returned by the native client
    /// and not owned elsewhere.
    pub(crate) unsafe fn from_raw(res: NonNull<pq_sys::PGresult>) -> Self {
        Self { res }
    }

    /// Execution status of this result.
    pub fn status(&self) -> ExecStatus {
        let status = unsafe { pq_sys::PQresultStatus(self.res.as_ptr()) };
        use pq_sys::ExecStatusType as T;
        if status == T::PGRES_EMPTY_QUERY {
            ExecStatus::EmptyQuery
        } else if status == T::PGRES_COMMAND_OK {
            ExecStatus::CommandOk
        } else if status == T::PGRES_TUPLES_OK {
            ExecStatus::TuplesOk
        } else if status == T::PGRES_SINGLE_TUPLE {
            ExecStatus::SingleTuple
        } else if status == T::PGRES_BAD_RESPONSE {
            ExecStatus::BadResponse
        } else if status == T::PGRES_NONFATAL_ERROR {
            ExecStatus::NonfatalError
        } else if status == T::PGRES_FATAL_ERROR {
            ExecStatus::FatalError
        } else if status == T::PGRES_COPY_OUT {
            ExecStatus::CopyOut
        } else if status == T::PGRES_COPY_IN {
            ExecStatus::CopyIn
        } else if status == T::PGRES_COPY_BOTH {
            ExecStatus::CopyBoth
        } else {
            ExecStatus::Unknown
        }
    }

    /// Number of rows in the result.
    pub fn ntuples(&self) -> usize {
        unsafe { pq_sys::PQntuples(self.res.as_ptr()) }.max(0) as usize
    }

    /// Number of columns in the result.
    pub fn nfields(&self) -> usize {
        unsafe { pq_sys::PQnfields(self.res.as_ptr()) }.max(0) as usize
    }

    /// Name of a column, if the index is in range.
    pub fn field_name(&self, col: usize) -> Option<String> {
        unsafe {
            let name = pq_sys::PQfname(self.res.as_ptr(), col as c_int);
            if name.is_null() {
                None
            } else {
                Some(CStr::from_ptr(name).to_string_lossy().into_owned())
            }
        }
    }

    /// Raw binary value of a cell, or `None` for SQL NULL.
    pub fn value(&self, row: usize, col: usize) -> Option<&[u8]> {
        unsafe {
            if pq_sys::PQgetisnull(self.res.as_ptr(), row as c_int, col as c_int) == 1 {
                return None;
            }
            let ptr = pq_sys::PQgetvalue(self.res.as_ptr(), row as c_int, col as c_int);
            if ptr.is_null() {
                return None;
            }
            let len = pq_sys::PQgetlength(self.res.as_ptr(), row as c_int, col as c_int);
            Some(std::slice::from_raw_parts(ptr.cast::<u8>(), len.max(0) as usize))
        }
    }

    /// Human-readable error text attached to this result.
    pub fn error_message(&self) -> String {
        unsafe {
            let msg = pq_sys::PQresultErrorMessage(self.res.as_ptr());
            if msg.is_null() {
                String::new()
            } else {
                CStr::from_ptr(msg).to_string_lossy().trim_end().to_string()
            }
        }
    }

    /// Server-reported SQLSTATE of this result, if any.
    pub fn sqlstate(&self) -> Option<String> {
        unsafe {
            let field = pq_sys::PQresultErrorField(self.res.as_ptr(), DIAG_SQLSTATE);
            if field.is_null() {
                None
            } else {
                Some(CStr::from_ptr(field).to_string_lossy().into_owned())
            }
        }
    }
}

impl Drop for PqResult {
    fn drop(&mut self) {
        unsafe { pq_sys::PQclear(self.res.as_ptr()) };
    }
}

impl std::fmt::Debug for PqResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PqResult")
            .field("status", &self.status())
            .field("ntuples", &self.ntuples())
            .field("nfields", &self.nfields())
            .finish()
    }
}
