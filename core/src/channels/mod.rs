//! Chat platform integrations

pub mod base;
pub mod discord;
#[cfg(test)]
pub mod mock;

pub use base::{Channel, ChatPlatform, OverrideTarget, PermissionOverride, PlatformResult};
pub use discord::{DiscordChannel, DiscordPlatform};
