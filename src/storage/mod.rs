// FILE: src/storage/mod.rs
//! Embedded persistent store
//!
//! One SQLite handle per [`Connection`], reached only through its
//! [`ConnectionGuard`]. Nothing here retries: every engine failure is
//! translated and handed back to the caller.

pub mod connection;
pub mod error;
pub mod result;
pub mod statement;

pub use connection::{Connection, ConnectionGuard, OpenMode, StoreOptions};
pub use error::{SqliteError, StoreError};
pub use statement::Statement;
