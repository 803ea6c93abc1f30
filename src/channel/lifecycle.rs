//! Channel lifecycle state machine
//!
//! `Idle -> Running -> Stopping -> Stopped`. Backends embed a [`Lifecycle`]
//! and route every driver request through [`Lifecycle::begin_request`]; the
//! returned guard keeps the request counted as in flight, and the last guard
//! to drop during `Stopping` completes the stop.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use super::stop::{StopFuture, StopSignal};
use super::{ChannelState, StopData};
use crate::error::{Result, VfsError};

struct Inner {
    state: ChannelState,
    in_flight: usize,
    serviced: u64,
}

pub struct Lifecycle {
    inner: Mutex<Inner>,
    signal: StopSignal,
    cancel: CancellationToken,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ChannelState::Idle,
                in_flight: 0,
                serviced: 0,
            }),
            signal: StopSignal::new(),
            cancel: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ChannelState {
        self.lock().state
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Move from `Idle` to `Running`, running `configure` first while no
    /// request can be admitted yet. On rejection `configure` never runs.
    pub fn start<F: FnOnce()>(&self, configure: F) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != ChannelState::Idle {
            return Err(VfsError::Lifecycle {
                operation: "start",
                state: inner.state,
            });
        }
        configure();
        inner.state = ChannelState::Running;
        Ok(())
    }

    /// Move from `Running` to `Stopping` and return without waiting. The
    /// stop completes right away if nothing is in flight.
    pub fn request_stop(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != ChannelState::Running {
            return Err(VfsError::Lifecycle {
                operation: "stop",
                state: inner.state,
            });
        }
        inner.state = ChannelState::Stopping;
        self.cancel.cancel();
        tracing::info!(
            "[Lifecycle] Stop requested with {} request(s) in flight",
            inner.in_flight
        );
        if inner.in_flight == 0 {
            self.complete(&mut inner);
        }
        Ok(())
    }

    /// Admit one driver request. Rejected once stopping has begun.
    pub fn begin_request(&self) -> Result<RequestGuard<'_>> {
        let mut inner = self.lock();
        match inner.state {
            ChannelState::Running => {
                inner.in_flight += 1;
                Ok(RequestGuard { lifecycle: self })
            }
            ChannelState::Stopping | ChannelState::Stopped => Err(VfsError::ShuttingDown),
            ChannelState::Idle => Err(VfsError::Lifecycle {
                operation: "service request",
                state: inner.state,
            }),
        }
    }

    fn end_request(&self) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.serviced += 1;
        if inner.state == ChannelState::Stopping && inner.in_flight == 0 {
            self.complete(&mut inner);
        }
    }

    fn complete(&self, inner: &mut Inner) {
        inner.state = ChannelState::Stopped;
        let data = StopData {
            requests_serviced: inner.serviced,
        };
        tracing::info!(
            "[Lifecycle] Channel stopped after servicing {} request(s)",
            data.requests_serviced
        );
        if let Err(e) = self.signal.fulfill(data) {
            tracing::error!("[Lifecycle] {}", e);
        }
    }

    /// Cache operations are only accepted while running or draining.
    pub fn ensure_active(&self, operation: &'static str) -> Result<()> {
        let state = self.state();
        match state {
            ChannelState::Running | ChannelState::Stopping => Ok(()),
            ChannelState::Idle | ChannelState::Stopped => {
                Err(VfsError::Lifecycle { operation, state })
            }
        }
    }

    pub fn stop_future(&self) -> StopFuture {
        self.signal.subscribe()
    }

    /// Token cancelled as soon as a stop is requested, for dispatcher work
    /// that should give up early.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// An admitted, in-flight driver request.
pub struct RequestGuard<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.end_request();
    }
}
