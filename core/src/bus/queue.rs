//! Ordered event queue feeding the dispatcher

use crate::error::{ChannelError, Result};
use crate::messages::InboundEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// Receiving half, owned by the single dispatcher
pub type EventReceiver = mpsc::UnboundedReceiver<InboundEvent>;

/// Event bus that decouples the chat platform from the ticket router
///
/// Platform handlers push events in arrival order; exactly one dispatcher
/// consumes them, so events are processed one at a time and never dropped.
#[derive(Clone)]
pub struct EventBus {
    inbound: mpsc::UnboundedSender<InboundEvent>,
}

impl EventBus {
    /// Create a new bus and the receiver for its dispatcher
    pub fn new() -> (Self, EventReceiver) {
        let (inbound, receiver) = mpsc::unbounded_channel();
        (Self { inbound }, receiver)
    }

    /// Publish an event from the platform
    pub fn publish(&self, event: InboundEvent) -> Result<()> {
        self.inbound.send(event).map_err(|e| {
            warn!("Failed to publish {} event: dispatcher is gone", e.0.kind());
            ChannelError::BusClosed.into()
        })
    }

    /// Whether the dispatcher has stopped
    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }
}
