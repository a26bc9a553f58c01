//! Base traits for the chat platform

use crate::error::{PlatformError, Result};
use crate::messages::{OutgoingMessage, Target};
use crate::types::{Attachment, ChannelId, MessageId, RoleId};
use async_trait::async_trait;

/// Result of a single platform call
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Who a permission override applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideTarget {
    /// The workspace-wide default role
    Everyone,
    /// A specific role
    Role(RoleId),
    /// The bot's own account, resolved by the platform
    Bot,
}

/// Channel permission override applied at creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionOverride {
    pub target: OverrideTarget,
    pub view: bool,
    pub send: bool,
}

impl PermissionOverride {
    /// Hide the channel from the target
    pub fn hidden(target: OverrideTarget) -> Self {
        Self {
            target,
            view: false,
            send: false,
        }
    }

    /// Let the target read and write
    pub fn read_write(target: OverrideTarget) -> Self {
        Self {
            target,
            view: true,
            send: true,
        }
    }
}

/// Operations the ticket router needs from a chat platform
///
/// Implementations map every native failure onto [`PlatformError`]; the
/// router never sees platform-specific error types.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Name of the platform, for logs
    fn name(&self) -> &str;

    /// Create a text channel under `parent`
    async fn create_sub_channel(
        &self,
        name: &str,
        parent: ChannelId,
        overrides: &[PermissionOverride],
    ) -> PlatformResult<ChannelId>;

    /// Delete a channel
    async fn delete_channel(&self, channel_id: ChannelId) -> PlatformResult<()>;

    /// Whether the channel still exists
    async fn channel_exists(&self, channel_id: ChannelId) -> PlatformResult<bool>;

    /// Send a message to a channel or as a direct message
    async fn send_message(&self, target: Target, message: OutgoingMessage)
    -> PlatformResult<MessageId>;

    /// Download an attachment so it can be re-uploaded elsewhere
    async fn fetch_attachment_bytes(&self, attachment: &Attachment) -> PlatformResult<Vec<u8>>;

    /// React to a message
    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> PlatformResult<()>;
}

/// A long-running connection that feeds inbound events
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the name of this channel
    fn name(&self) -> &str;

    /// Start the channel (runs until the connection ends)
    async fn start(&self) -> Result<()>;

    /// Stop the channel
    async fn stop(&self) -> Result<()>;

    /// Check if the channel is configured to run
    fn is_enabled(&self) -> bool;
}
