//! Prepared statements
//!
//! A [`Statement`] borrows the [`ConnectionGuard`] it was prepared under, so
//! it cannot be used once the connection lock is released, and the guard
//! cannot close the connection while the statement is alive.
//!
//! ```
//! use vfs_channel::Connection;
//!
//! let conn = Connection::open(":memory:").unwrap();
//! let guard = conn.lock().unwrap();
//! let mut stmt = guard.prepare("SELECT 1").unwrap();
//! assert!(stmt.step().unwrap());
//! assert_eq!(stmt.column_u64(0).unwrap(), 1);
//! ```
//!
//! A statement cannot escape the block holding its guard:
//!
//! ```compile_fail
//! use vfs_channel::Connection;
//!
//! let conn = Connection::open(":memory:").unwrap();
//! let mut stmt = {
//!     let guard = conn.lock().unwrap();
//!     guard.prepare("SELECT 1").unwrap()
//! };
//! stmt.step().unwrap();
//! ```
//!
//! Nor can the guard close the connection underneath a live statement:
//!
//! ```compile_fail
//! use vfs_channel::Connection;
//!
//! let conn = Connection::open(":memory:").unwrap();
//! let mut guard = conn.lock().unwrap();
//! let mut stmt = guard.prepare("SELECT 1").unwrap();
//! guard.close();
//! stmt.step().unwrap();
//! ```
//!
//! A borrowed blob must outlive the statement it is bound to:
//!
//! ```compile_fail
//! use vfs_channel::Connection;
//!
//! let conn = Connection::open(":memory:").unwrap();
//! let guard = conn.lock().unwrap();
//! let mut stmt = guard.prepare("SELECT ?1").unwrap();
//! {
//!     let key = vec![1u8, 2, 3];
//!     stmt.bind_blob_borrowed(1, &key).unwrap();
//! }
//! stmt.step().unwrap();
//! ```

use std::marker::PhantomData;
use std::os::raw::c_int;
use std::ptr::{self, NonNull};
use std::slice;

use rusqlite::ffi;

use super::connection::ConnectionGuard;
use super::error::{Result, StoreError};
use super::result;

pub struct Statement<'g> {
    db: *mut ffi::sqlite3,
    stmt: NonNull<ffi::sqlite3_stmt>,
    failed: bool,
    _guard: PhantomData<&'g ()>,
}

impl<'g> Statement<'g> {
    /// Compile `query` against the connection behind `guard`.
    pub fn prepare(guard: &'g ConnectionGuard<'_>, query: &str) -> Result<Self> {
        let db = guard.handle()?;
        let len = c_int::try_from(query.len()).map_err(|_| StoreError::QueryTooLong(query.len()))?;
        tracing::trace!("{}", query);

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: `db` is live for as long as `guard` is borrowed, and the
        // length bounds the query bytes.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, query.as_ptr().cast(), len, &mut stmt, ptr::null_mut())
        };
        unsafe { result::check(db, rc) }?;

        // Whitespace or a lone comment compiles to nothing.
        let stmt = NonNull::new(stmt).ok_or(StoreError::EmptyQuery)?;
        Ok(Self {
            db,
            stmt,
            failed: false,
            _guard: PhantomData,
        })
    }

    /// Bind `blob` to the 1-based parameter `index`. The engine copies the
    /// bytes, so `blob` may be dropped right after the call.
    pub fn bind_blob(&mut self, index: usize, blob: &[u8]) -> Result<()> {
        // SAFETY: SQLITE_TRANSIENT makes the engine copy before returning.
        unsafe { self.bind_blob_raw(index, blob, ffi::SQLITE_TRANSIENT()) }
    }

    /// Bind `blob` without copying it.
    ///
    /// The engine keeps a pointer to the bytes until the statement is
    /// finalized or the parameter is rebound. Handing it memory that is
    /// freed earlier is undefined behaviour in the engine; here the borrow
    /// must outlive the statement, so that case does not compile.
    pub fn bind_blob_borrowed(&mut self, index: usize, blob: &'g [u8]) -> Result<()> {
        // SAFETY: `blob` lives at least as long as the statement.
        unsafe { self.bind_blob_raw(index, blob, ffi::SQLITE_STATIC()) }
    }

    unsafe fn bind_blob_raw(
        &mut self,
        index: usize,
        blob: &[u8],
        destructor: ffi::sqlite3_destructor_type,
    ) -> Result<()> {
        self.ensure_usable()?;
        let param = to_c_index(index)?;
        let rc = ffi::sqlite3_bind_blob64(
            self.stmt.as_ptr(),
            param,
            blob.as_ptr().cast(),
            blob.len() as ffi::sqlite3_uint64,
            destructor,
        );
        result::check(self.db, rc)?;
        Ok(())
    }

    /// Bind an unsigned integer. Values above `i64::MAX` are stored as their
    /// two's complement and read back exactly by [`Statement::column_u64`],
    /// but compare as negative numbers inside SQL.
    pub fn bind_u64(&mut self, index: usize, value: u64) -> Result<()> {
        self.ensure_usable()?;
        let param = to_c_index(index)?;
        let rc = unsafe { ffi::sqlite3_bind_int64(self.stmt.as_ptr(), param, value as i64) };
        unsafe { result::check(self.db, rc) }?;
        Ok(())
    }

    pub fn bind_null(&mut self, index: usize) -> Result<()> {
        self.ensure_usable()?;
        let param = to_c_index(index)?;
        let rc = unsafe { ffi::sqlite3_bind_null(self.stmt.as_ptr(), param) };
        unsafe { result::check(self.db, rc) }?;
        Ok(())
    }

    /// Advance to the next row.
    ///
    /// `Ok(true)` means a row is ready to be read. `Ok(false)` means the
    /// result set is exhausted; the statement has been reset and may be
    /// rebound and stepped again. Any error leaves the statement unusable.
    pub fn step(&mut self) -> Result<bool> {
        self.ensure_usable()?;
        // SAFETY: the statement and its connection are live while borrowed.
        let rc = unsafe { ffi::sqlite3_step(self.stmt.as_ptr()) };
        match rc {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => {
                unsafe { ffi::sqlite3_reset(self.stmt.as_ptr()) };
                Ok(false)
            }
            code => {
                self.failed = true;
                if !result::is_failure(code) {
                    return Err(StoreError::Invariant {
                        operation: "sqlite3_step",
                        code,
                    });
                }
                match unsafe { result::translate(self.db, code) } {
                    Some(err) => Err(StoreError::Engine(err)),
                    None => Err(StoreError::Invariant {
                        operation: "sqlite3_step",
                        code,
                    }),
                }
            }
        }
    }

    /// Column `index` of the current row as bytes. Text columns yield their
    /// UTF-8 encoding; NULL yields an empty slice.
    pub fn column_blob(&self, index: usize) -> Result<&[u8]> {
        let col = self.column_index(index)?;
        unsafe {
            let data = ffi::sqlite3_column_blob(self.stmt.as_ptr(), col);
            // Length must be fetched after the pointer.
            let len = ffi::sqlite3_column_bytes(self.stmt.as_ptr(), col);
            if data.is_null() || len <= 0 {
                return Ok(&[]);
            }
            // SAFETY: the buffer stays valid until the next step, reset or
            // finalize, all of which need `&mut self`.
            Ok(slice::from_raw_parts(data.cast::<u8>(), len as usize))
        }
    }

    /// Column `index` of the current row as an unsigned 64-bit integer.
    pub fn column_u64(&self, index: usize) -> Result<u64> {
        let col = self.column_index(index)?;
        Ok(unsafe { ffi::sqlite3_column_int64(self.stmt.as_ptr(), col) } as u64)
    }

    pub fn column_is_null(&self, index: usize) -> Result<bool> {
        let col = self.column_index(index)?;
        Ok(unsafe { ffi::sqlite3_column_type(self.stmt.as_ptr(), col) } == ffi::SQLITE_NULL)
    }

    /// Number of columns the query produces.
    pub fn column_count(&self) -> usize {
        unsafe { ffi::sqlite3_column_count(self.stmt.as_ptr()) }.max(0) as usize
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.failed {
            return Err(StoreError::StatementFailed);
        }
        Ok(())
    }

    /// Columns are only readable while a row is current, which
    /// `sqlite3_data_count` reports as a non-zero width.
    fn column_index(&self, index: usize) -> Result<c_int> {
        let available = if self.failed {
            0
        } else {
            unsafe { ffi::sqlite3_data_count(self.stmt.as_ptr()) }.max(0) as usize
        };
        if index >= available {
            return Err(StoreError::Column { index, available });
        }
        to_c_index(index)
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        // SAFETY: finalized exactly once, here; the connection is still open
        // because the guard is borrowed.
        unsafe { ffi::sqlite3_finalize(self.stmt.as_ptr()) };
    }
}

fn to_c_index(index: usize) -> Result<c_int> {
    c_int::try_from(index).map_err(|_| StoreError::Index(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Connection;

    fn memory() -> Connection {
        Connection::open(":memory:").unwrap()
    }

    #[test]
    fn test_blob_round_trip() {
        let conn = memory();
        let guard = conn.lock().unwrap();
        let mut stmt = guard.prepare("SELECT ?1").unwrap();

        let large: Vec<u8> = (0..8192u32).map(|i| (i % 251) as u8).collect();
        for blob in [&b""[..], &b"\x00\x01\xff"[..], &large[..]] {
            stmt.bind_blob(1, blob).unwrap();
            assert!(stmt.step().unwrap());
            assert_eq!(stmt.column_blob(0).unwrap(), blob);
            assert!(!stmt.step().unwrap());
        }
    }

    #[test]
    fn test_empty_blob_is_not_null() {
        let conn = memory();
        let guard = conn.lock().unwrap();
        let mut stmt = guard.prepare("SELECT ?1 IS NULL, length(?1)").unwrap();
        stmt.bind_blob(1, b"").unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_u64(0).unwrap(), 0);
        assert_eq!(stmt.column_u64(1).unwrap(), 0);
    }

    #[test]
    fn test_u64_round_trip() {
        let conn = memory();
        let guard = conn.lock().unwrap();
        guard
            .execute_batch("CREATE TABLE numbers (value INTEGER NOT NULL)")
            .unwrap();

        let mut insert = guard.prepare("INSERT INTO numbers (value) VALUES (?1)").unwrap();
        for value in [0, 1, i64::MAX as u64, u64::MAX] {
            insert.bind_u64(1, value).unwrap();
            assert!(!insert.step().unwrap());
        }

        let mut select = guard.prepare("SELECT value FROM numbers ORDER BY rowid").unwrap();
        let mut seen = Vec::new();
        while select.step().unwrap() {
            seen.push(select.column_u64(0).unwrap());
        }
        assert_eq!(seen, vec![0, 1, i64::MAX as u64, u64::MAX]);
    }

    #[test]
    fn test_exhausted_statement_resets() {
        let conn = memory();
        let guard = conn.lock().unwrap();
        guard
            .execute_batch(
                "CREATE TABLE kv (key BLOB PRIMARY KEY, value BLOB NOT NULL);
                 INSERT INTO kv VALUES (x'01', x'aa'), (x'02', x'bb');",
            )
            .unwrap();

        let mut stmt = guard.prepare("SELECT value FROM kv WHERE key = ?1").unwrap();
        stmt.bind_blob(1, &[0x01]).unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_blob(0).unwrap(), &[0xaa]);
        assert!(!stmt.step().unwrap());

        // No row is current after the reset.
        assert!(matches!(
            stmt.column_blob(0),
            Err(StoreError::Column { index: 0, available: 0 })
        ));

        stmt.bind_blob(1, &[0x02]).unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_blob(0).unwrap(), &[0xbb]);
        assert!(!stmt.step().unwrap());
    }

    #[test]
    fn test_borrowed_blob_binding() {
        let conn = memory();
        let guard = conn.lock().unwrap();
        let payload = vec![7u8; 4096];
        let mut stmt = guard.prepare("SELECT length(?1), ?1").unwrap();
        stmt.bind_blob_borrowed(1, &payload).unwrap();
        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_u64(0).unwrap(), 4096);
        assert_eq!(stmt.column_blob(1).unwrap(), &payload[..]);
    }

    #[test]
    fn test_column_reads_need_a_row() {
        let conn = memory();
        let guard = conn.lock().unwrap();
        let mut stmt = guard.prepare("SELECT 1, NULL").unwrap();
        assert_eq!(stmt.column_count(), 2);
        assert!(matches!(stmt.column_u64(0), Err(StoreError::Column { .. })));

        assert!(stmt.step().unwrap());
        assert_eq!(stmt.column_u64(0).unwrap(), 1);
        assert!(stmt.column_is_null(1).unwrap());
        assert!(matches!(
            stmt.column_u64(2),
            Err(StoreError::Column { index: 2, available: 2 })
        ));
    }

    #[test]
    fn test_step_failure_is_fatal() {
        let conn = memory();
        let guard = conn.lock().unwrap();
        guard
            .execute_batch("CREATE TABLE uniq (value INTEGER UNIQUE)")
            .unwrap();

        let mut insert = guard.prepare("INSERT INTO uniq (value) VALUES (?1)").unwrap();
        insert.bind_u64(1, 42).unwrap();
        assert!(!insert.step().unwrap());

        let err = insert.step().unwrap_err();
        let sqlite = err.sqlite().expect("engine diagnostic");
        assert_eq!(sqlite.code & 0xff, ffi::SQLITE_CONSTRAINT);
        assert!(sqlite.to_string().starts_with("sqlite error: 19: "));
        assert!(sqlite.message.as_deref().unwrap().contains("UNIQUE"));

        assert!(matches!(insert.step(), Err(StoreError::StatementFailed)));
        assert!(matches!(insert.bind_u64(1, 43), Err(StoreError::StatementFailed)));
    }

    #[test]
    fn test_bind_out_of_range() {
        let conn = memory();
        let guard = conn.lock().unwrap();
        let mut stmt = guard.prepare("SELECT ?1").unwrap();
        let err = stmt.bind_blob(2, b"x").unwrap_err();
        assert_eq!(err.sqlite().unwrap().code, ffi::SQLITE_RANGE);
        // Bind errors do not poison the statement.
        stmt.bind_blob(1, b"x").unwrap();
        assert!(stmt.step().unwrap());
    }

    #[test]
    fn test_prepare_errors() {
        let conn = memory();
        let guard = conn.lock().unwrap();
        assert!(matches!(guard.prepare("   "), Err(StoreError::EmptyQuery)));
        let err = match guard.prepare("SELECT * FROM missing_table") {
            Err(err) => err,
            Ok(_) => panic!("prepare should fail"),
        };
        assert!(err.to_string().contains("no such table: missing_table"));
    }
}
