//! vfs-channel: virtual filesystem channel core
//!
//! Two independent halves:
//! - Channel (lifecycle state machine + cache invalidation surface that an
//!   OS virtualization driver backend implements)
//! - Storage (one SQLite handle per connection, serialized through an
//!   exclusive guard, with prepared statements bound to that guard)

pub mod channel;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;

pub use channel::{
    CacheController, ChannelState, Dispatcher, FsChannel, InProcessChannel, LocalDirDispatcher,
    StopData, StopFuture,
};
pub use config::Config;
pub use crate::core::{CacheStats, EntryAttr, EntryKind, RelativePath};
pub use error::{Result, VfsError};
pub use storage::{Connection, ConnectionGuard, OpenMode, SqliteError, Statement, StoreError, StoreOptions};
