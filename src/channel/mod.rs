//! Virtual filesystem channels
//!
//! A channel is one live session between the owner and an OS virtualization
//! driver for a single mount. The owner starts it, keeps its cache coherent
//! through [`CacheController`] while the driver keeps issuing requests on
//! its own threads, asks it to stop, and then awaits the [`StopFuture`]
//! before tearing anything down.
//!
//! Implementations are deliberately not `Clone`: a channel stands for
//! exclusive ownership of a mount.

use std::fmt;

pub mod dispatcher;
pub mod in_process;
pub mod lifecycle;
pub mod stop;

pub use dispatcher::{Dispatcher, LocalDirDispatcher};
pub use in_process::InProcessChannel;
pub use lifecycle::{Lifecycle, RequestGuard};
pub use stop::{StopFuture, StopSignal};

use crate::core::path::RelativePath;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Idle => "idle",
            ChannelState::Running => "running",
            ChannelState::Stopping => "stopping",
            ChannelState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Delivered once, when a stopped channel has fully quiesced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopData {
    /// Driver requests the channel answered over its lifetime.
    pub requests_serviced: u64,
}

/// Invalidation surface a running (or draining) channel exposes.
///
/// Every operation is total over paths: evicting something that was never
/// cached succeeds.
pub trait CacheController {
    /// Evict any cached positive knowledge of `path`.
    fn remove_cached_file(&self, path: &RelativePath) -> Result<()>;

    /// Install a directory stub at `path` so access populates it lazily
    /// instead of failing with not-found. Idempotent.
    fn add_directory_placeholder(&self, path: &RelativePath) -> Result<()>;

    /// Evict every cached "does not exist" answer. A no-op when negative
    /// path caching was not enabled at start.
    fn flush_negative_path_cache(&self) -> Result<()>;
}

pub trait FsChannel: CacheController + Send + Sync {
    /// Begin servicing driver requests. Only valid once, from idle.
    fn start(&self, read_only: bool, use_negative_path_caching: bool) -> Result<()>;

    /// Request shutdown and return immediately. Completion is observed
    /// through [`FsChannel::stop_future`].
    fn stop(&self) -> Result<()>;

    /// Observer of the one stop-completion signal this channel owns.
    fn stop_future(&self) -> StopFuture;

    fn state(&self) -> ChannelState;
}
