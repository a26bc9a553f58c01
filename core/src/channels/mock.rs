//! In-memory chat platform that records every call

use super::base::{ChatPlatform, PermissionOverride, PlatformResult};
use crate::error::PlatformError;
use crate::messages::{Attribution, OutgoingMessage, Target};
use crate::types::{Attachment, ChannelId, MessageId, UserId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    CreateChannel {
        name: String,
        parent: ChannelId,
        overrides: Vec<PermissionOverride>,
    },
    DeleteChannel(ChannelId),
    ChannelExists(ChannelId),
    Send(SentMessage),
    Fetch(String),
    React { channel_id: ChannelId, message_id: MessageId, emoji: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub target: Target,
    pub content: String,
    pub attribution: Option<Attribution>,
    pub files: Vec<String>,
    pub close_button: bool,
}

#[derive(Default)]
struct State {
    calls: Vec<PlatformCall>,
    channels: HashSet<ChannelId>,
    next_id: u64,
    create_failure: Option<PlatformError>,
    exists_failure: Option<PlatformError>,
    unreachable_users: HashSet<UserId>,
    broken_channels: HashSet<ChannelId>,
    broken_attachments: HashSet<String>,
}

/// Scriptable fake platform for router and dispatcher tests
pub struct MockPlatform {
    state: Mutex<State>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Make every channel creation fail with `err`
    pub fn fail_create(&self, err: PlatformError) {
        self.state().create_failure = Some(err);
    }

    pub fn allow_create(&self) {
        self.state().create_failure = None;
    }

    /// Make every existence check fail with `err`
    pub fn fail_exists(&self, err: PlatformError) {
        self.state().exists_failure = Some(err);
    }

    pub fn allow_exists(&self) {
        self.state().exists_failure = None;
    }

    /// Refuse direct messages to `user`
    pub fn block_dms(&self, user: UserId) {
        self.state().unreachable_users.insert(user);
    }

    /// Delete a channel behind the router's back
    pub fn vanish(&self, channel_id: ChannelId) {
        self.state().channels.remove(&channel_id);
    }

    /// Channel still listed as existing, but sends to it fail with NotFound
    pub fn break_channel(&self, channel_id: ChannelId) {
        self.state().broken_channels.insert(channel_id);
    }

    pub fn break_attachment(&self, url: &str) {
        self.state().broken_attachments.insert(url.to_string());
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state().calls.clone()
    }

    pub fn created_channels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::CreateChannel { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Permission overrides passed to each channel creation, in order
    pub fn created_overrides(&self) -> Vec<Vec<PermissionOverride>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::CreateChannel { overrides, .. } => Some(overrides),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_channels(&self) -> Vec<ChannelId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::DeleteChannel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Send(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub fn sent_to(&self, target: Target) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.target == target).collect()
    }

    pub fn reactions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::React { emoji, .. } => Some(emoji),
                _ => None,
            })
            .collect()
    }

    pub fn channel_alive(&self, channel_id: ChannelId) -> bool {
        self.state().channels.contains(&channel_id)
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_sub_channel(
        &self,
        name: &str,
        parent: ChannelId,
        overrides: &[PermissionOverride],
    ) -> PlatformResult<ChannelId> {
        // let concurrent callers interleave here, like a real network call
        tokio::task::yield_now().await;

        let mut state = self.state();
        state.calls.push(PlatformCall::CreateChannel {
            name: name.to_string(),
            parent,
            overrides: overrides.to_vec(),
        });
        if let Some(err) = state.create_failure.clone() {
            return Err(err);
        }
        state.next_id += 1;
        let id = ChannelId(state.next_id);
        state.channels.insert(id);
        Ok(id)
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> PlatformResult<()> {
        let mut state = self.state();
        state.calls.push(PlatformCall::DeleteChannel(channel_id));
        if state.channels.remove(&channel_id) {
            Ok(())
        } else {
            Err(PlatformError::NotFound(format!("channel {}", channel_id)))
        }
    }

    async fn channel_exists(&self, channel_id: ChannelId) -> PlatformResult<bool> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        state.calls.push(PlatformCall::ChannelExists(channel_id));
        if let Some(err) = state.exists_failure.clone() {
            return Err(err);
        }
        Ok(state.channels.contains(&channel_id))
    }

    async fn send_message(
        &self,
        target: Target,
        message: OutgoingMessage,
    ) -> PlatformResult<MessageId> {
        let mut state = self.state();
        state.calls.push(PlatformCall::Send(SentMessage {
            target,
            content: message.content,
            attribution: message.attribution,
            files: message.files.into_iter().map(|f| f.filename).collect(),
            close_button: message.close_button,
        }));
        match target {
            Target::User(user) if state.unreachable_users.contains(&user) => Err(
                PlatformError::TargetUnreachable(format!("user {} does not accept DMs", user)),
            ),
            Target::Channel(channel)
                if !state.channels.contains(&channel) || state.broken_channels.contains(&channel) =>
            {
                Err(PlatformError::NotFound(format!("channel {}", channel)))
            }
            _ => {
                state.next_id += 1;
                Ok(MessageId(state.next_id))
            }
        }
    }

    async fn fetch_attachment_bytes(&self, attachment: &Attachment) -> PlatformResult<Vec<u8>> {
        let mut state = self.state();
        state.calls.push(PlatformCall::Fetch(attachment.url.clone()));
        if state.broken_attachments.contains(&attachment.url) {
            return Err(PlatformError::NotFound(attachment.url.clone()));
        }
        Ok(attachment.filename.as_bytes().to_vec())
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> PlatformResult<()> {
        self.state().calls.push(PlatformCall::React {
            channel_id,
            message_id,
            emoji: emoji.to_string(),
        });
        Ok(())
    }
}
