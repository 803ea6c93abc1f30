//! Source of truth behind a channel
//!
//! The channel answers driver requests from its cache when it can and asks
//! its [`Dispatcher`] otherwise. [`LocalDirDispatcher`] serves a real
//! directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::cache::EntryAttr;
use crate::core::path::RelativePath;
use crate::error::{Result, VfsError};

pub trait Dispatcher: Send + Sync {
    /// Attributes of `path`, or `None` if it does not exist.
    fn lookup(&self, path: &RelativePath) -> Result<Option<EntryAttr>>;

    /// Full contents of the file at `path`.
    fn read(&self, path: &RelativePath) -> Result<Vec<u8>>;

    /// Replace (or create) the file at `path`.
    fn write(&self, path: &RelativePath, data: &[u8]) -> Result<EntryAttr>;

    /// Remove the file or empty directory at `path`.
    fn remove(&self, path: &RelativePath) -> Result<()>;
}

/// Serves paths from a directory on the local filesystem.
pub struct LocalDirDispatcher {
    root: PathBuf,
}

impl LocalDirDispatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn attr_of(metadata: &fs::Metadata) -> EntryAttr {
        let mtime = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);
        if metadata.is_dir() {
            EntryAttr::directory(mtime)
        } else {
            EntryAttr::file(metadata.len(), mtime)
        }
    }
}

impl Dispatcher for LocalDirDispatcher {
    fn lookup(&self, path: &RelativePath) -> Result<Option<EntryAttr>> {
        match fs::metadata(path.to_path(&self.root)) {
            Ok(metadata) => Ok(Some(Self::attr_of(&metadata))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&self, path: &RelativePath) -> Result<Vec<u8>> {
        match fs::read(path.to_path(&self.root)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(VfsError::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, path: &RelativePath, data: &[u8]) -> Result<EntryAttr> {
        let target = path.to_path(&self.root);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, data)?;
        Ok(Self::attr_of(&fs::metadata(&target)?))
    }

    fn remove(&self, path: &RelativePath) -> Result<()> {
        let target = path.to_path(&self.root);
        let metadata = match fs::symlink_metadata(&target) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VfsError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            fs::remove_dir(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        Ok(())
    }
}
