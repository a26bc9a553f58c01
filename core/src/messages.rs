//! Event and payload types flowing between the platform and the router

use crate::types::{Attachment, ChannelId, FileUpload, MessageId, UserId, UserRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound event delivered by the chat platform, in arrival order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// An end user wrote to the bot in private
    DirectMessageReceived {
        user: UserRef,
        content: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
        #[serde(default = "Utc::now")]
        received_at: DateTime<Utc>,
    },
    /// Someone wrote in a workspace channel
    ChannelMessageReceived {
        channel_id: ChannelId,
        author: UserRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<MessageId>,
        content: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
        #[serde(default = "Utc::now")]
        received_at: DateTime<Utc>,
    },
    /// Staff asked to close the ticket bound to a channel
    CloseActionInvoked {
        channel_id: ChannelId,
        actor: UserRef,
    },
    /// Staff asked to message a user directly from any channel
    StaffReplyRequested {
        channel_id: ChannelId,
        staff: UserRef,
        user_id: UserId,
        content: String,
    },
}

impl InboundEvent {
    /// Create a direct message event
    pub fn direct_message(user: UserRef, content: impl Into<String>) -> Self {
        InboundEvent::DirectMessageReceived {
            user,
            content: content.into(),
            attachments: Vec::new(),
            received_at: Utc::now(),
        }
    }

    /// Create a channel message event
    pub fn channel_message(
        channel_id: impl Into<ChannelId>,
        author: UserRef,
        content: impl Into<String>,
    ) -> Self {
        InboundEvent::ChannelMessageReceived {
            channel_id: channel_id.into(),
            author,
            message_id: None,
            content: content.into(),
            attachments: Vec::new(),
            received_at: Utc::now(),
        }
    }

    /// Create a close action event
    pub fn close(channel_id: impl Into<ChannelId>, actor: UserRef) -> Self {
        InboundEvent::CloseActionInvoked {
            channel_id: channel_id.into(),
            actor,
        }
    }

    /// Attach files to a message event; no-op for other kinds
    pub fn with_attachments(mut self, files: Vec<Attachment>) -> Self {
        match &mut self {
            InboundEvent::DirectMessageReceived { attachments, .. }
            | InboundEvent::ChannelMessageReceived { attachments, .. } => *attachments = files,
            _ => {}
        }
        self
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::DirectMessageReceived { .. } => "direct_message",
            InboundEvent::ChannelMessageReceived { .. } => "channel_message",
            InboundEvent::CloseActionInvoked { .. } => "close",
            InboundEvent::StaffReplyRequested { .. } => "staff_reply",
        }
    }
}

/// Where an outgoing message goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Channel(ChannelId),
    User(UserId),
}

/// Who a relayed message is attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribution {
    /// Written by the end user, shown to staff
    User(UserRef),
    /// Written by a staff member, shown to the end user
    Staff(UserRef),
}

impl Attribution {
    pub fn author(&self) -> &UserRef {
        match self {
            Attribution::User(user) | Attribution::Staff(user) => user,
        }
    }
}

/// Message sent through the platform
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    /// Message text
    pub content: String,
    /// Relay attribution, `None` for bot notices
    pub attribution: Option<Attribution>,
    /// Files, in the order they were received
    pub files: Vec<FileUpload>,
    /// Attach the ticket close button
    pub close_button: bool,
}

impl OutgoingMessage {
    /// Create a plain notice
    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a relayed message
    pub fn relay(attribution: Attribution, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attribution: Some(attribution),
            ..Default::default()
        }
    }

    /// Add uploaded files
    pub fn with_files(mut self, files: Vec<FileUpload>) -> Self {
        self.files = files;
        self
    }

    /// Add the close button
    pub fn with_close_button(mut self) -> Self {
        self.close_button = true;
        self
    }
}
