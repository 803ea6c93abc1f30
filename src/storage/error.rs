//! Error types for the embedded store

use std::fmt;
use std::os::raw::c_int;

use rusqlite::ffi;
use thiserror::Error;

/// A failed SQLite result code, translated for logging and inspection.
///
/// The textual form is consumed by log scrapers and must stay
/// `sqlite error: <code>: <description>[ <connection message>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteError {
    /// Raw result code as returned by the engine.
    pub code: c_int,
    /// The engine's static description of `code` (`sqlite3_errstr`).
    pub description: String,
    /// Most recent message recorded on the connection (`sqlite3_errmsg`),
    /// present only when a live connection was available.
    pub message: Option<String>,
}

impl SqliteError {
    /// Primary error class of the code.
    pub fn kind(&self) -> ffi::ErrorCode {
        ffi::Error::new(self.code).code
    }

    /// True for lock contention codes a caller may choose to retry.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.kind(),
            ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked
        )
    }
}

impl fmt::Display for SqliteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sqlite error: {}: {}", self.code, self.description)?;
        if let Some(message) = &self.message {
            write!(f, " {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for SqliteError {}

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store at `address` could not be opened.
    #[error("{source}")]
    Open {
        address: String,
        source: SqliteError,
    },

    #[error("Invalid store address {0:?}: contains a NUL byte")]
    InvalidAddress(String),

    /// Any non-success result from prepare, bind, step or exec.
    #[error(transparent)]
    Engine(#[from] SqliteError),

    /// The engine returned a code outside the OK/ROW/DONE/error space.
    #[error("Unexpected sqlite result code {code} from {operation}")]
    Invariant {
        operation: &'static str,
        code: c_int,
    },

    #[error("Connection is closed")]
    Closed,

    #[error("Connection lock poisoned")]
    Poisoned,

    #[error("Statement failed earlier and must be prepared again")]
    StatementFailed,

    #[error("Query contains no statement")]
    EmptyQuery,

    #[error("Query contains a NUL byte")]
    NulInQuery,

    #[error("Query text too long ({0} bytes)")]
    QueryTooLong(usize),

    #[error("Invalid value {value:?} for PRAGMA {pragma}")]
    InvalidPragma { pragma: &'static str, value: String },

    #[error("Index {0} is out of range")]
    Index(usize),

    #[error("Column {index} is not readable: current row has {available} columns")]
    Column { index: usize, available: usize },
}

impl StoreError {
    /// The translated engine diagnostic, if this error carries one.
    pub fn sqlite(&self) -> Option<&SqliteError> {
        match self {
            StoreError::Open { source, .. } => Some(source),
            StoreError::Engine(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
