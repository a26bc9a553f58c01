//! Modmail Core Library
//!
//! This library contains the core of the modmail ticket router: the
//! routing table and ticket lifecycle, the chat platform abstraction and
//! its Discord implementation, the inbound event bus and dispatcher,
//! configuration and the optional HTTP status gateway.

pub mod bus;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod ticket;
pub mod types;

// Re-exports for convenience
pub use bus::{EventBus, EventReceiver};
pub use channels::{Channel, ChatPlatform, DiscordChannel, DiscordPlatform};
pub use config::{
    Config, DiscordConfig, GatewayConfig, TicketsConfig, get_config_dir, get_config_path,
    load_config, load_config_from, save_config, save_config_to,
};
pub use dispatcher::{DispatchStats, Dispatcher, EventOutcome};
pub use error::*;
pub use gateway::GatewayServer;
pub use messages::{Attribution, InboundEvent, OutgoingMessage, Target};
pub use ticket::{CloseResult, DeliveryResult, RouterSettings, Ticket, TicketRouter, TicketState};
pub use types::*;
