//! Database connection management
//!
//! A [`Connection`] owns exactly one SQLite handle behind a mutex. The only
//! way to reach the handle is [`Connection::lock`], which hands out a
//! [`ConnectionGuard`]; statements borrow that guard, so every prepare and
//! step on a connection is serialized and no statement can outlive the lock
//! it was prepared under.

use std::ffi::CString;
use std::os::raw::c_int;
use std::ptr::{self, NonNull};
use std::sync::{Mutex, MutexGuard};

use rusqlite::ffi;

use super::error::{Result, StoreError};
use super::result;
use super::statement::Statement;

/// How the store file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Existing store, no writes.
    ReadOnly,
    /// Existing store, read and write.
    ReadWrite,
    /// Read and write, creating the store if it does not exist.
    #[default]
    Create,
}

impl OpenMode {
    fn flags(self) -> c_int {
        match self {
            OpenMode::ReadOnly => ffi::SQLITE_OPEN_READONLY,
            OpenMode::ReadWrite => ffi::SQLITE_OPEN_READWRITE,
            OpenMode::Create => ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
        }
    }
}

/// Settings applied right after the handle is opened.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub mode: OpenMode,
    /// `PRAGMA journal_mode`, skipped for read-only stores.
    pub journal_mode: Option<String>,
    /// `PRAGMA synchronous`, skipped for read-only stores.
    pub synchronous: Option<String>,
    pub foreign_keys: bool,
    /// Zero leaves SQLite's default (fail immediately with `SQLITE_BUSY`).
    pub busy_timeout_ms: u32,
}

impl StoreOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(journal_mode) = &self.journal_mode {
            check_pragma("journal_mode", journal_mode, JOURNAL_MODES)?;
        }
        if let Some(synchronous) = &self.synchronous {
            check_pragma("synchronous", synchronous, SYNCHRONOUS_MODES)?;
        }
        Ok(())
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            mode: OpenMode::Create,
            journal_mode: Some(WAL.to_string()),
            synchronous: Some(NORMAL.to_string()),
            foreign_keys: true,
            busy_timeout_ms: 0,
        }
    }
}

struct RawDb(NonNull<ffi::sqlite3>);

// SAFETY: the handle is only ever touched through the owning mutex, and the
// bundled engine is built in serialized threading mode.
unsafe impl Send for RawDb {}

/// Exclusive owner of one SQLite handle.
pub struct Connection {
    address: String,
    db: Mutex<Option<RawDb>>,
}

impl Connection {
    /// Open (creating if needed) the store at `address`.
    pub fn open(address: &str) -> Result<Self> {
        Self::open_mode(address, OpenMode::Create)
    }

    /// Open the store and apply `options`.
    ///
    /// Pragma values are checked against the engine's keywords before the
    /// store is touched.
    pub fn open_with(address: &str, options: &StoreOptions) -> Result<Self> {
        options.validate()?;
        let conn = Self::open_mode(address, options.mode)?;
        conn.lock()?.configure(options)?;
        Ok(conn)
    }

    fn open_mode(address: &str, mode: OpenMode) -> Result<Self> {
        let c_address =
            CString::new(address).map_err(|_| StoreError::InvalidAddress(address.to_string()))?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: `c_address` is NUL terminated and `db` is a valid out pointer.
        let rc = unsafe { ffi::sqlite3_open_v2(c_address.as_ptr(), &mut db, mode.flags(), ptr::null()) };

        // SAFETY: the diagnostic is taken without the handle, which may be
        // half-initialised; the handle is released right after.
        if let Err(source) = unsafe { result::check(ptr::null_mut(), rc) } {
            // SQLite hands back a handle even on most open failures.
            unsafe { ffi::sqlite3_close(db) };
            tracing::warn!("[Store] Failed to open {}: {}", address, source);
            return Err(StoreError::Open {
                address: address.to_string(),
                source,
            });
        }

        let db = NonNull::new(db).ok_or(StoreError::Invariant {
            operation: "sqlite3_open_v2",
            code: rc,
        })?;

        tracing::debug!("[Store] Opened {} ({:?})", address, mode);
        Ok(Self {
            address: address.to_string(),
            db: Mutex::new(Some(RawDb(db))),
        })
    }

    /// Acquire exclusive access to the handle, blocking while another
    /// holder has it.
    ///
    /// Calling this (or [`Connection::close`]) while the current thread
    /// already holds a guard on the same connection deadlocks.
    pub fn lock(&self) -> Result<ConnectionGuard<'_>> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(ConnectionGuard {
            address: &self.address,
            db,
        })
    }

    /// Release the handle. Later calls, and later `lock`-then-prepare
    /// attempts, see a closed connection.
    ///
    /// Waits for the current guard holder, so the handle is never released
    /// while one of its statements is alive.
    pub fn close(&self) {
        let mut db = self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        close_handle(&self.address, &mut db);
    }

    pub fn is_closed(&self) -> bool {
        self.db
            .lock()
            .map(|db| db.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner().is_none())
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let db = self.db.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        close_handle(&self.address, db);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn close_handle(address: &str, db: &mut Option<RawDb>) {
    if let Some(raw) = db.take() {
        // SAFETY: the handle came from sqlite3_open_v2 and is released once;
        // `take` leaves `None` behind for every later call.
        let rc = unsafe { ffi::sqlite3_close(raw.0.as_ptr()) };
        if let Some(err) = result::describe(rc) {
            tracing::warn!("[Store] Closing {} reported {}", address, err);
        } else {
            tracing::debug!("[Store] Closed {}", address);
        }
    }
}

/// Exclusive access to a [`Connection`]'s handle.
///
/// Not `Send`: a guard, and the statements prepared under it, stay on the
/// thread that acquired the lock.
pub struct ConnectionGuard<'c> {
    address: &'c str,
    db: MutexGuard<'c, Option<RawDb>>,
}

impl<'c> ConnectionGuard<'c> {
    pub(crate) fn handle(&self) -> Result<*mut ffi::sqlite3> {
        self.db
            .as_ref()
            .map(|raw| raw.0.as_ptr())
            .ok_or(StoreError::Closed)
    }

    /// Compile `query` against this connection.
    pub fn prepare(&self, query: &str) -> Result<Statement<'_>> {
        Statement::prepare(self, query)
    }

    /// Run one or more `;`-separated statements, discarding any rows.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let db = self.handle()?;
        let c_sql = CString::new(sql).map_err(|_| StoreError::NulInQuery)?;
        tracing::trace!("{}", sql);
        // SAFETY: `db` is live while the guard is held; no callback is passed.
        let rc = unsafe {
            ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), ptr::null_mut())
        };
        unsafe { result::check(db, rc) }?;
        Ok(())
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_insert_rowid(&self) -> Result<i64> {
        let db = self.handle()?;
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(db) })
    }

    /// Rows modified by the most recently completed statement.
    pub fn changes(&self) -> Result<u64> {
        let db = self.handle()?;
        Ok(unsafe { ffi::sqlite3_changes(db) }.max(0) as u64)
    }

    pub fn is_closed(&self) -> bool {
        self.db.is_none()
    }

    /// Close the connection from inside the lock.
    ///
    /// Takes `&mut self`, so no statement prepared under this guard can
    /// still be alive.
    pub fn close(&mut self) {
        close_handle(self.address, &mut self.db);
    }

    fn configure(&self, options: &StoreOptions) -> Result<()> {
        let db = self.handle()?;
        if options.busy_timeout_ms > 0 {
            let timeout = c_int::try_from(options.busy_timeout_ms).unwrap_or(c_int::MAX);
            let rc = unsafe { ffi::sqlite3_busy_timeout(db, timeout) };
            unsafe { result::check(db, rc) }?;
        }

        if options.mode == OpenMode::ReadOnly {
            return Ok(());
        }

        if let Some(journal_mode) = &options.journal_mode {
            self.execute_batch(&format!("PRAGMA journal_mode = {}", journal_mode))?;
        }
        if let Some(synchronous) = &options.synchronous {
            self.execute_batch(&format!("PRAGMA synchronous = {}", synchronous))?;
        }
        let foreign_keys = if options.foreign_keys { ON } else { OFF };
        self.execute_batch(&format!("PRAGMA foreign_keys = {}", foreign_keys))?;

        tracing::debug!("[Store] Configured {} with {:?}", self.address, options);
        Ok(())
    }
}

// SQL pragma constants
const WAL: &str = "WAL";
const NORMAL: &str = "NORMAL";
const ON: &str = "ON";
const OFF: &str = "OFF";

const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", WAL, OFF];
const SYNCHRONOUS_MODES: &[&str] = &[OFF, NORMAL, "FULL", "EXTRA", "0", "1", "2", "3"];

/// Pragma values are spliced into SQL text, so only known keywords pass.
fn check_pragma(pragma: &'static str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.iter().any(|keyword| keyword.eq_ignore_ascii_case(value)) {
        return Ok(());
    }
    Err(StoreError::InvalidPragma {
        pragma,
        value: value.to_string(),
    })
}
