//! Transport gateway seam — the external collaborator that performs the
//! actual I/O and reports progress and a single terminal result.
//!
//! The core consumes this contract and nothing else: `dispatch` starts a
//! transfer and returns an opaque [`GatewayHandle`], events flow back over a
//! channel, and `suspend`/`resume`/`cancel` request control changes through
//! the handle. Control is cooperative — the gateway may take time to honor a
//! request, and the registry's own state remains authoritative for the
//! caller's view in the meantime.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::config::EffectiveConfig;
use crate::error::{Error, Result};
use crate::types::{RawResponse, RequestDescriptor, TransferProgress};

#[cfg(feature = "gateway-http")]
mod http;

#[cfg(feature = "gateway-http")]
pub use http::HttpGateway;

/// Event emitted by a gateway for one dispatched transfer.
///
/// Any number of `Progress` events may precede exactly one terminal event
/// (`Completed` or `Failed`).
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Bytes moved; may fire many times.
    Progress(TransferProgress),
    /// The transfer finished and the gateway considers it successful.
    Completed(RawResponse),
    /// The transfer finished with a transport-level error.
    Failed(Error),
}

/// Sender half the gateway uses to report events for one transfer.
pub type EventSender = mpsc::UnboundedSender<GatewayEvent>;

/// Receiver half the registry pumps events from.
pub type EventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Create the event channel for one dispatch.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Control request communicated to an in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// Proceed (initial state, and the state after a resume).
    Run,
    /// Park the transfer at the next safe point.
    Suspend,
    /// Abort the transfer.
    Cancel,
}

/// Opaque reference to an in-flight transport operation.
///
/// The registry holds one per task and uses it to request pause, resume, and
/// abort from the gateway. Dropping the handle does not cancel the transfer.
#[derive(Debug)]
pub struct GatewayHandle {
    control: watch::Sender<ControlState>,
}

impl GatewayHandle {
    /// Create a handle and the control receiver the gateway's transfer loop
    /// watches.
    pub fn new() -> (Self, watch::Receiver<ControlState>) {
        let (control, rx) = watch::channel(ControlState::Run);
        (Self { control }, rx)
    }

    /// Request a control change. Send errors mean the transfer loop is gone
    /// (already finished); that is not an error for the caller.
    pub fn request(&self, state: ControlState) {
        let _ = self.control.send(state);
    }

    /// The control state most recently requested.
    pub fn requested(&self) -> ControlState {
        *self.control.borrow()
    }
}

/// Transport gateway contract.
///
/// Implementations own their worker pool and connection management. All
/// methods must be non-blocking from the caller's perspective: `dispatch`
/// starts the transfer in the background and returns immediately.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Start a transfer for the given resolved configuration and
    /// descriptor. Events for the transfer are delivered on `events`,
    /// ending with exactly one terminal event.
    async fn dispatch(
        &self,
        config: EffectiveConfig,
        descriptor: RequestDescriptor,
        events: EventSender,
    ) -> Result<GatewayHandle>;

    /// Ask the transfer behind `handle` to park at its next safe point.
    async fn suspend(&self, handle: &GatewayHandle) -> Result<()> {
        handle.request(ControlState::Suspend);
        Ok(())
    }

    /// Ask a parked (or not-yet-started) transfer to proceed.
    async fn resume(&self, handle: &GatewayHandle) -> Result<()> {
        handle.request(ControlState::Run);
        Ok(())
    }

    /// Ask the transfer to abort. Cooperative: the transfer may not stop
    /// mid-byte, but no terminal event will follow a honored cancel.
    async fn cancel(&self, handle: &GatewayHandle) -> Result<()> {
        handle.request(ControlState::Cancel);
        Ok(())
    }
}

/// Wait on a control receiver until it allows the transfer to proceed.
///
/// Returns `Ok(())` when running, or `Err` with a cancelled marker when the
/// transfer should abort. Used by gateway implementations between I/O steps.
pub async fn wait_until_runnable(control: &mut watch::Receiver<ControlState>) -> Result<()> {
    loop {
        // Copy the state out so the borrow guard is released before awaiting
        // a control change.
        let state = *control.borrow();
        match state {
            ControlState::Run => return Ok(()),
            ControlState::Cancel => return Err(Error::transport("transfer cancelled")),
            ControlState::Suspend => {
                // Parked; wake on the next control change. A closed channel
                // means the handle owner is gone, treat as cancel.
                if control.changed().await.is_err() {
                    return Err(Error::transport("transfer cancelled"));
                }
            }
        }
    }
}
