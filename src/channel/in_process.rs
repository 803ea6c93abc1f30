// FILE: src/channel/in_process.rs
//! In-process channel backend
//!
//! Driver threads call [`InProcessChannel::lookup`], [`read`], [`write`] and
//! [`remove`] directly. Answers come from the [`PathCache`] when possible and
//! from the [`Dispatcher`] otherwise; the owner keeps the cache coherent
//! through [`CacheController`].
//!
//! [`read`]: InProcessChannel::read
//! [`write`]: InProcessChannel::write
//! [`remove`]: InProcessChannel::remove

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::dispatcher::Dispatcher;
use super::lifecycle::Lifecycle;
use super::stop::StopFuture;
use super::{CacheController, ChannelState, FsChannel};
use crate::core::cache::{CacheStats, Cached, EntryAttr, PathCache};
use crate::core::path::RelativePath;
use crate::error::{Result, VfsError};

pub struct InProcessChannel<D: Dispatcher> {
    dispatcher: D,
    lifecycle: Lifecycle,
    cache: PathCache,
    read_only: AtomicBool,
}

impl<D: Dispatcher> InProcessChannel<D> {
    pub fn new(dispatcher: D, content_cache_capacity: usize) -> Self {
        Self {
            dispatcher,
            lifecycle: Lifecycle::new(),
            cache: PathCache::new(content_cache_capacity),
            read_only: AtomicBool::new(false),
        }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cancelled as soon as [`FsChannel::stop`] is called.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.lifecycle.cancellation_token()
    }

    /// Attributes of `path`, or `None` if it does not exist.
    pub fn lookup(&self, path: &RelativePath) -> Result<Option<EntryAttr>> {
        let _request = self.lifecycle.begin_request()?;
        self.lookup_cached(path)
    }

    fn lookup_cached(&self, path: &RelativePath) -> Result<Option<EntryAttr>> {
        if path.is_root() {
            return Ok(Some(EntryAttr::placeholder()));
        }
        match self.cache.lookup(path) {
            Cached::Hit(attr) => Ok(Some(attr)),
            Cached::Negative => Ok(None),
            Cached::Placeholder => {
                // Populate lazily; an unresolved placeholder still exists.
                Ok(Some(self.resolve(path)?.unwrap_or_else(EntryAttr::placeholder)))
            }
            Cached::Miss => self.resolve(path),
        }
    }

    fn resolve(&self, path: &RelativePath) -> Result<Option<EntryAttr>> {
        let generation = self.cache.generation();
        match self.dispatcher.lookup(path)? {
            Some(attr) => {
                self.cache.insert(path, attr.clone(), generation);
                Ok(Some(attr))
            }
            None => {
                self.cache.record_negative(path, generation);
                Ok(None)
            }
        }
    }

    /// Contents of the file at `path`.
    pub fn read(&self, path: &RelativePath) -> Result<Arc<Vec<u8>>> {
        let _request = self.lifecycle.begin_request()?;
        if let Some(data) = self.cache.content(path) {
            return Ok(data);
        }

        let attr = self
            .lookup_cached(path)?
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        if attr.is_dir() {
            return Err(VfsError::IsDirectory(path.to_string()));
        }

        let generation = self.cache.generation();
        let data = Arc::new(self.dispatcher.read(path)?);
        self.cache.insert_content(path, Arc::clone(&data), generation);
        Ok(data)
    }

    /// Replace or create the file at `path`.
    pub fn write(&self, path: &RelativePath, data: &[u8]) -> Result<EntryAttr> {
        let _request = self.lifecycle.begin_request()?;
        self.ensure_writable(path)?;

        // Parents may have been created even when the write itself fails.
        let written = self.dispatcher.write(path, data);
        self.forget_with_ancestors(path);
        let attr = written?;
        tracing::debug!("[InProcessChannel] Wrote {} ({} bytes)", path, data.len());
        Ok(attr)
    }

    /// Remove the file or empty directory at `path`.
    pub fn remove(&self, path: &RelativePath) -> Result<()> {
        let _request = self.lifecycle.begin_request()?;
        self.ensure_writable(path)?;

        let removed = self.dispatcher.remove(path);
        self.cache.forget(path);
        removed?;
        tracing::debug!("[InProcessChannel] Removed {}", path);
        Ok(())
    }

    fn forget_with_ancestors(&self, path: &RelativePath) {
        self.cache.forget(path);
        for ancestor in path.ancestors().filter(|a| !a.is_root()) {
            self.cache.forget(&ancestor);
        }
    }

    fn ensure_writable(&self, path: &RelativePath) -> Result<()> {
        if self.is_read_only() {
            tracing::warn!("[InProcessChannel] Rejected mutation of {} on read-only mount", path);
            return Err(VfsError::ReadOnly(path.to_string()));
        }
        Ok(())
    }
}

impl<D: Dispatcher> CacheController for InProcessChannel<D> {
    fn remove_cached_file(&self, path: &RelativePath) -> Result<()> {
        self.lifecycle.ensure_active("remove_cached_file")?;
        self.cache.remove(path);
        tracing::debug!("[InProcessChannel] Invalidated {}", path);
        Ok(())
    }

    fn add_directory_placeholder(&self, path: &RelativePath) -> Result<()> {
        self.lifecycle.ensure_active("add_directory_placeholder")?;
        self.cache.add_placeholder(path);
        tracing::debug!("[InProcessChannel] Placeholder at {}", path);
        Ok(())
    }

    fn flush_negative_path_cache(&self) -> Result<()> {
        self.lifecycle.ensure_active("flush_negative_path_cache")?;
        let flushed = self.cache.flush_negative();
        tracing::debug!("[InProcessChannel] Flushed {} negative entries", flushed);
        Ok(())
    }
}

impl<D: Dispatcher> FsChannel for InProcessChannel<D> {
    fn start(&self, read_only: bool, use_negative_path_caching: bool) -> Result<()> {
        self.lifecycle.start(|| {
            self.read_only.store(read_only, Ordering::SeqCst);
            self.cache.set_negative_caching(use_negative_path_caching);
        })?;
        tracing::info!(
            "[InProcessChannel] Started (read_only={}, negative_path_caching={})",
            read_only,
            use_negative_path_caching
        );
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.lifecycle.request_stop()
    }

    fn stop_future(&self) -> StopFuture {
        self.lifecycle.stop_future()
    }

    fn state(&self) -> ChannelState {
        self.lifecycle.state()
    }
}
