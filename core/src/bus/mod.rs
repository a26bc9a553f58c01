//! Inbound event queue between the platform and the dispatcher

pub mod queue;

pub use queue::{EventBus, EventReceiver};
pub use crate::messages::InboundEvent;
