//! Stop-completion signal
//!
//! A one-shot broadcast cell: any number of [`StopFuture`]s, taken before or
//! after completion, all observe the single [`StopData`] it is fulfilled
//! with.

use std::future::{Future, IntoFuture};
use std::pin::Pin;

use tokio::sync::watch;

use super::{ChannelState, StopData};
use crate::error::{Result, VfsError};

pub struct StopSignal {
    tx: watch::Sender<Option<StopData>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> StopFuture {
        StopFuture {
            rx: self.tx.subscribe(),
        }
    }

    /// Fulfil the signal. A second fulfilment is rejected and leaves the
    /// first value in place.
    pub fn fulfill(&self, data: StopData) -> Result<()> {
        let fulfilled = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(data);
            true
        });
        if !fulfilled {
            return Err(VfsError::Lifecycle {
                operation: "fulfill stop signal",
                state: ChannelState::Stopped,
            });
        }
        Ok(())
    }

    pub fn is_fulfilled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer of a channel's stop completion. Cheap to clone.
#[derive(Clone)]
pub struct StopFuture {
    rx: watch::Receiver<Option<StopData>>,
}

impl StopFuture {
    /// The stop data, if the channel has already quiesced.
    pub fn peek(&self) -> Option<StopData> {
        self.rx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait for the channel to quiesce.
    ///
    /// Fails with [`VfsError::ChannelDropped`] only if the channel is dropped
    /// without ever completing a stop.
    pub async fn wait(mut self) -> Result<StopData> {
        let slot = self
            .rx
            .wait_for(|slot| slot.is_some())
            .await
            .map_err(|_| VfsError::ChannelDropped)?;
        slot.as_ref().cloned().ok_or(VfsError::ShuttingDown)
    }
}

impl IntoFuture for StopFuture {
    type Output = Result<StopData>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<StopData>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
