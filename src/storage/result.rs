//! Result code translation
//!
//! Turns an engine result code, plus the connection it came from when one is
//! available, into a [`SqliteError`]. The connection often holds the more
//! useful half of the diagnostic (`near "SELEC": syntax error`), so both are
//! kept.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::ptr;

use rusqlite::ffi;

use super::error::SqliteError;

/// Translate `code` into an error, or `None` for `SQLITE_OK`.
///
/// # Safety
///
/// `db` must be null or a handle that has not been closed.
pub(crate) unsafe fn translate(db: *mut ffi::sqlite3, code: c_int) -> Option<SqliteError> {
    if code == ffi::SQLITE_OK {
        return None;
    }
    let description = owned_cstr(ffi::sqlite3_errstr(code)).unwrap_or_default();
    let message = if db.is_null() {
        None
    } else {
        owned_cstr(ffi::sqlite3_errmsg(db))
    };
    Some(SqliteError {
        code,
        description,
        message,
    })
}

/// [`translate`] as a `Result`, for use with `?`.
///
/// # Safety
///
/// Same contract as [`translate`].
pub(crate) unsafe fn check(db: *mut ffi::sqlite3, code: c_int) -> Result<(), SqliteError> {
    match translate(db, code) {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

/// Translate a code with no connection context.
pub fn describe(code: c_int) -> Option<SqliteError> {
    // SAFETY: a null handle is never dereferenced.
    unsafe { translate(ptr::null_mut(), code) }
}

/// Primary codes SQLite uses for failures (`SQLITE_ERROR` ..= `SQLITE_NOTADB`).
pub(crate) fn is_failure(code: c_int) -> bool {
    (ffi::SQLITE_ERROR..=ffi::SQLITE_NOTADB).contains(&(code & 0xff))
}

unsafe fn owned_cstr(raw: *const c_char) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    Some(CStr::from_ptr(raw).to_string_lossy().into_owned())
}
