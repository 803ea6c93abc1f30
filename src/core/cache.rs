// FILE: src/core/cache.rs
//! Path existence and content cache
//!
//! Holds what the backend has already learned from its dispatcher: positive
//! attributes per path, file contents (bounded, least recently used first
//! out), negative "does not exist" answers, and directory placeholders
//! installed by the owner.
//!
//! Every invalidation bumps a generation counter under an exclusive lock.
//! Lookups capture the generation before asking the dispatcher and only
//! publish their answer if nothing was invalidated in the meantime, so an
//! answer resolved before an invalidation can never resurface after it.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::{DashMap, DashSet};
use lru::LruCache;

use crate::core::path::RelativePath;

const DEFAULT_CONTENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Attributes the backend reports for an existing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttr {
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: SystemTime,
}

impl EntryAttr {
    pub fn file(size: u64, mtime: SystemTime) -> Self {
        Self { kind: EntryKind::File, size, mtime }
    }

    pub fn directory(mtime: SystemTime) -> Self {
        Self { kind: EntryKind::Directory, size: 0, mtime }
    }

    /// Stub reported for a placeholder the dispatcher has not populated.
    pub fn placeholder() -> Self {
        Self::directory(UNIX_EPOCH)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// What the cache knows about a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached {
    Hit(EntryAttr),
    Negative,
    Placeholder,
    Miss,
}

/// Counters for operability; a snapshot, not a live view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub negative_hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub stale_inserts_dropped: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    negative_hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    stale_inserts_dropped: AtomicU64,
}

pub struct PathCache {
    entries: DashMap<RelativePath, EntryAttr>,
    contents: Mutex<LruCache<RelativePath, Arc<Vec<u8>>>>,
    negative: DashSet<RelativePath>,
    placeholders: DashSet<RelativePath>,
    generation: RwLock<u64>,
    negative_enabled: AtomicBool,
    counters: Counters,
}

impl PathCache {
    pub fn new(content_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(content_capacity)
            .or(NonZeroUsize::new(DEFAULT_CONTENT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: DashMap::new(),
            contents: Mutex::new(LruCache::new(capacity)),
            negative: DashSet::new(),
            placeholders: DashSet::new(),
            generation: RwLock::new(0),
            negative_enabled: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn set_negative_caching(&self, enabled: bool) {
        self.negative_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn negative_caching(&self) -> bool {
        self.negative_enabled.load(Ordering::SeqCst)
    }

    /// Current generation; pass it back to the `insert_*` calls.
    pub fn generation(&self) -> u64 {
        *self.generation.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, path: &RelativePath) -> Cached {
        if let Some(attr) = self.entries.get(path) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Cached::Hit(attr.clone());
        }
        if self.placeholders.contains(path) {
            return Cached::Placeholder;
        }
        if self.negative_caching() && self.negative.contains(path) {
            self.counters.negative_hits.fetch_add(1, Ordering::Relaxed);
            return Cached::Negative;
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Cached::Miss
    }

    pub fn content(&self, path: &RelativePath) -> Option<Arc<Vec<u8>>> {
        let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        contents.get(path).cloned()
    }

    /// Publish attributes resolved at `generation`. Returns false when an
    /// invalidation happened since, in which case nothing is stored.
    pub fn insert(&self, path: &RelativePath, attr: EntryAttr, generation: u64) -> bool {
        let current = self.generation.read().unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(*current, generation, path) {
            return false;
        }
        self.negative.remove(path);
        self.entries.insert(path.clone(), attr);
        true
    }

    pub fn insert_content(&self, path: &RelativePath, data: Arc<Vec<u8>>, generation: u64) -> bool {
        let current = self.generation.read().unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(*current, generation, path) {
            return false;
        }
        let mut contents = self.contents.lock().unwrap_or_else(PoisonError::into_inner);
        contents.put(path.clone(), data);
        true
    }

    /// Remember that `path` does not exist. Ignored when negative caching is
    /// off or the answer is stale.
    pub fn record_negative(&self, path: &RelativePath, generation: u64) -> bool {
        if !self.negative_caching() {
            return false;
        }
        let current = self.generation.read().unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(*current, generation, path) {
            return false;
        }
        self.negative.insert(path.clone());
        true
    }

    fn is_current(&self, current: u64, generation: u64, path: &RelativePath) -> bool {
        if current == generation {
            return true;
        }
        self.counters.stale_inserts_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "[PathCache] Dropped stale answer for {} (generation {} < {})",
            path,
            generation,
            current
        );
        false
    }

    /// Evict every positive piece of knowledge about `path`: attributes,
    /// content and a placeholder at exactly that path.
    pub fn remove(&self, path: &RelativePath) {
        let mut generation = self.generation.write().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.entries.remove(path);
        self.placeholders.remove(path);
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(path);
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Forget `path` entirely, negative answer included. Used after the
    /// backend itself mutated the path.
    pub fn forget(&self, path: &RelativePath) {
        let mut generation = self.generation.write().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.entries.remove(path);
        self.negative.remove(path);
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(path);
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Install a directory stub at `path` and at each of its non-root
    /// ancestors, clearing any negative answers that would hide them.
    pub fn add_placeholder(&self, path: &RelativePath) {
        let mut generation = self.generation.write().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        for dir in std::iter::once(path.clone()).chain(path.ancestors()) {
            if dir.is_root() {
                continue;
            }
            self.negative.remove(&dir);
            self.placeholders.insert(dir);
        }
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush_negative(&self) -> usize {
        let mut generation = self.generation.write().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        let flushed = self.negative.len();
        self.negative.clear();
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        flushed
    }

    pub fn is_placeholder(&self, path: &RelativePath) -> bool {
        self.placeholders.contains(path)
    }

    pub fn negative_len(&self) -> usize {
        self.negative.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            negative_hits: self.counters.negative_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            stale_inserts_dropped: self.counters.stale_inserts_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENT_CAPACITY)
    }
}
