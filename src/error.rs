//! Error types for vfs-channel

use thiserror::Error;

use crate::channel::ChannelState;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Read-only channel rejected mutation of {0}")]
    ReadOnly(String),

    #[error("Channel is shutting down")]
    ShuttingDown,

    /// An operation invoked in a state that does not permit it.
    #[error("{operation} is not permitted while the channel is {state}")]
    Lifecycle {
        operation: &'static str,
        state: ChannelState,
    },

    #[error("Channel was dropped before its stop completed")]
    ChannelDropped,

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl VfsError {
    /// Errno a driver backend replies with for this error.
    pub fn errno(&self) -> i32 {
        match self {
            VfsError::NotFound(_) => libc::ENOENT,
            VfsError::IsDirectory(_) => libc::EISDIR,
            VfsError::ReadOnly(_) => libc::EROFS,
            VfsError::ShuttingDown | VfsError::ChannelDropped => libc::ESHUTDOWN,
            VfsError::InvalidPath(_) | VfsError::Lifecycle { .. } => libc::EINVAL,
            VfsError::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            VfsError::Store(_) | VfsError::Config(_) | VfsError::Other(_) => libc::EIO,
        }
    }

    pub fn is_lifecycle_violation(&self) -> bool {
        matches!(self, VfsError::Lifecycle { .. })
    }
}

pub type Result<T> = std::result::Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(VfsError::NotFound("a".into()).errno(), libc::ENOENT);
        assert_eq!(VfsError::ReadOnly("a".into()).errno(), libc::EROFS);
        assert_eq!(VfsError::ShuttingDown.errno(), libc::ESHUTDOWN);
        let io = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(VfsError::Io(io).errno(), libc::EACCES);
        let lifecycle = VfsError::Lifecycle {
            operation: "start",
            state: ChannelState::Running,
        };
        assert_eq!(lifecycle.errno(), libc::EINVAL);
        assert_eq!(
            lifecycle.to_string(),
            "start is not permitted while the channel is running"
        );
    }

    #[test]
    fn test_store_error_keeps_sqlite_text() {
        let err = VfsError::from(StoreError::Engine(
            crate::storage::result::describe(rusqlite::ffi::SQLITE_BUSY).unwrap(),
        ));
        assert_eq!(
            err.to_string(),
            "Store error: sqlite error: 5: database is locked"
        );
    }
}
