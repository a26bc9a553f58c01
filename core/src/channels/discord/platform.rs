//! Discord implementation of the chat platform over serenity's HTTP client

use super::components::render_message;
use crate::channels::base::{ChatPlatform, OverrideTarget, PermissionOverride, PlatformResult};
use crate::config::Config;
use crate::error::PlatformError;
use crate::messages::{OutgoingMessage, Target};
use crate::types::{Attachment, ChannelId, MessageId};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::debug;

/// Which kind of call failed, so HTTP statuses map to the right error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    CreateChannel,
    ChannelLookup,
    SendToChannel,
    SendToUser,
    Other,
}

/// Map a Discord HTTP status onto a platform error kind
fn map_status(kind: CallKind, status: Option<u16>, detail: String) -> PlatformError {
    match (kind, status) {
        (CallKind::SendToUser, Some(403 | 404)) => PlatformError::TargetUnreachable(detail),
        (_, Some(401 | 403)) => PlatformError::PermissionDenied(detail),
        (_, Some(404)) => PlatformError::NotFound(detail),
        _ => PlatformError::Other(detail),
    }
}

fn classify(kind: CallKind, err: serenity::Error) -> PlatformError {
    let status = match &err {
        serenity::Error::Http(http_err) => http_err.status_code().map(|s| s.as_u16()),
        _ => None,
    };
    map_status(kind, status, err.to_string())
}

/// Discord-backed [`ChatPlatform`]
pub struct DiscordPlatform {
    http: Arc<serenity::Http>,
    guild_id: serenity::GuildId,
    client: reqwest::Client,
}

impl DiscordPlatform {
    /// Create a platform client for the configured guild
    pub fn new(config: &Config) -> Self {
        Self::with_http(
            Arc::new(serenity::Http::new(&config.discord.token)),
            config.discord.guild_id,
        )
    }

    /// Create a platform client over an existing HTTP client
    pub fn with_http(http: Arc<serenity::Http>, guild_id: u64) -> Self {
        Self {
            http,
            guild_id: serenity::GuildId::new(guild_id),
            client: reqwest::Client::new(),
        }
    }

    /// Name of the bot account, used by `modmail check`
    pub async fn current_user_name(&self) -> PlatformResult<String> {
        self.http
            .get_current_user()
            .await
            .map(|user| user.name.clone())
            .map_err(|e| classify(CallKind::Other, e))
    }

    /// Whether `category` exists and is a category channel
    pub async fn category_exists(&self, category: ChannelId) -> PlatformResult<bool> {
        let channel = serenity::ChannelId::new(category.get());
        match channel.to_channel(self.http.as_ref()).await {
            Ok(serenity::Channel::Guild(guild_channel)) => {
                Ok(guild_channel.kind == serenity::ChannelType::Category)
            }
            Ok(_) => Ok(false),
            Err(e) => match classify(CallKind::ChannelLookup, e) {
                PlatformError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn permission_overwrites(
        &self,
        overrides: &[PermissionOverride],
    ) -> PlatformResult<Vec<serenity::PermissionOverwrite>> {
        let mut overwrites = Vec::with_capacity(overrides.len());
        for entry in overrides {
            let kind = match entry.target {
                // the @everyone role shares the guild's id
                OverrideTarget::Everyone => serenity::PermissionOverwriteType::Role(
                    serenity::RoleId::new(self.guild_id.get()),
                ),
                OverrideTarget::Role(role) => {
                    serenity::PermissionOverwriteType::Role(serenity::RoleId::new(role.get()))
                }
                OverrideTarget::Bot => {
                    let me = self
                        .http
                        .get_current_user()
                        .await
                        .map_err(|e| classify(CallKind::CreateChannel, e))?;
                    serenity::PermissionOverwriteType::Member(me.id)
                }
            };

            let mut granted = serenity::Permissions::empty();
            if entry.view {
                granted |= serenity::Permissions::VIEW_CHANNEL;
            }
            if entry.send {
                granted |= serenity::Permissions::SEND_MESSAGES
                    | serenity::Permissions::ATTACH_FILES
                    | serenity::Permissions::READ_MESSAGE_HISTORY;
            }
            let denied = if entry.view {
                serenity::Permissions::empty()
            } else {
                serenity::Permissions::VIEW_CHANNEL
            };

            overwrites.push(serenity::PermissionOverwrite {
                allow: granted,
                deny: denied,
                kind,
            });
        }
        Ok(overwrites)
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    fn name(&self) -> &str {
        "discord"
    }

    async fn create_sub_channel(
        &self,
        name: &str,
        parent: ChannelId,
        overrides: &[PermissionOverride],
    ) -> PlatformResult<ChannelId> {
        if !self.category_exists(parent).await? {
            return Err(PlatformError::CategoryNotFound(parent.get()));
        }

        let overwrites = self.permission_overwrites(overrides).await?;
        let builder = serenity::CreateChannel::new(name)
            .kind(serenity::ChannelType::Text)
            .category(serenity::ChannelId::new(parent.get()))
            .permissions(overwrites);

        let channel = self
            .guild_id
            .create_channel(self.http.as_ref(), builder)
            .await
            .map_err(|e| classify(CallKind::CreateChannel, e))?;

        debug!("created discord channel #{} ({})", channel.name, channel.id);
        Ok(ChannelId(channel.id.get()))
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> PlatformResult<()> {
        serenity::ChannelId::new(channel_id.get())
            .delete(self.http.as_ref())
            .await
            .map(|_| ())
            .map_err(|e| classify(CallKind::ChannelLookup, e))
    }

    async fn channel_exists(&self, channel_id: ChannelId) -> PlatformResult<bool> {
        match serenity::ChannelId::new(channel_id.get())
            .to_channel(self.http.as_ref())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match classify(CallKind::ChannelLookup, e) {
                PlatformError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn send_message(
        &self,
        target: Target,
        message: OutgoingMessage,
    ) -> PlatformResult<MessageId> {
        let builder = render_message(message);
        let sent = match target {
            Target::Channel(channel_id) => serenity::ChannelId::new(channel_id.get())
                .send_message(self.http.as_ref(), builder)
                .await
                .map_err(|e| classify(CallKind::SendToChannel, e))?,
            Target::User(user_id) => {
                let dm = serenity::UserId::new(user_id.get())
                    .create_dm_channel(self.http.as_ref())
                    .await
                    .map_err(|e| classify(CallKind::SendToUser, e))?;
                dm.id
                    .send_message(self.http.as_ref(), builder)
                    .await
                    .map_err(|e| classify(CallKind::SendToUser, e))?
            }
        };
        Ok(MessageId(sent.id.get()))
    }

    async fn fetch_attachment_bytes(&self, attachment: &Attachment) -> PlatformResult<Vec<u8>> {
        let response = self
            .client
            .get(&attachment.url)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn add_reaction(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> PlatformResult<()> {
        serenity::ChannelId::new(channel_id.get())
            .create_reaction(
                self.http.as_ref(),
                serenity::MessageId::new(message_id.get()),
                serenity::ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .map_err(|e| classify(CallKind::Other, e))
    }
}
