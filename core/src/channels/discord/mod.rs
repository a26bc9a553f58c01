//! discord channel using serenity and poise

mod components;
mod platform;

pub use components::{close_button_row, is_close_button, render_message, CLOSE_BUTTON_ID};
pub use platform::DiscordPlatform;

use super::base::Channel;
use crate::bus::EventBus;
use crate::config::Config;
use crate::error::{ChannelError, Result};
use crate::messages::InboundEvent;
use crate::types::{Attachment, UserId, UserRef};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// poise data
pub struct Data {
    /// event bus feeding the dispatcher
    pub bus: EventBus,
    /// modmail configuration
    pub config: Config,
}

/// poise error type
pub type DiscordError = serenity::Error;

type Context<'a> = poise::Context<'a, Data, DiscordError>;

/// discord gateway connection: turns discord events into bus events
pub struct DiscordChannel {
    config: Config,
    bus: EventBus,
    shard_manager: Arc<RwLock<Option<Arc<serenity::ShardManager>>>>,
}

impl DiscordChannel {
    /// create new discord channel
    pub fn new(config: Config, bus: EventBus) -> Result<Self> {
        if config.discord.token.is_empty() {
            return Err(ChannelError::NotConfigured("Discord".to_string()).into());
        }

        Ok(Self {
            config,
            bus,
            shard_manager: Arc::new(RwLock::new(None)),
        })
    }

    /// get user roles from discord
    async fn get_user_roles(
        guild_id: Option<serenity::GuildId>,
        http: &serenity::Http,
        user_id: serenity::UserId,
    ) -> Vec<serenity::RoleId> {
        if let Some(gid) = guild_id
            && let Ok(member) = gid.member(http, user_id).await
        {
            return member.roles;
        }
        Vec::new()
    }
}

/// whether `roles` satisfy the configured staff role; no role configured means anyone
fn has_staff_role(staff_role: Option<u64>, roles: &[serenity::RoleId]) -> bool {
    match staff_role {
        Some(role) => roles.iter().any(|r| r.get() == role),
        None => true,
    }
}

/// check whether the command author may act on tickets
async fn is_staff(ctx: &Context<'_>) -> bool {
    let staff_role = ctx.data().config.tickets.staff_role_id;
    if staff_role.is_none() {
        return true;
    }
    let roles =
        DiscordChannel::get_user_roles(ctx.guild_id(), ctx.http(), ctx.author().id).await;
    has_staff_role(staff_role, &roles)
}

fn user_ref(user: &serenity::User) -> UserRef {
    UserRef::new(user.id.get(), user.name.clone()).with_avatar(user.face())
}

fn attachments_of(message: &serenity::Message) -> Vec<Attachment> {
    message
        .attachments
        .iter()
        .map(|a| {
            let mut attachment = Attachment::new(a.filename.clone(), a.url.clone());
            attachment.size = u64::from(a.size);
            attachment
        })
        .collect()
}

/// event for a private message to the bot, `None` if there is nothing to relay
fn direct_message_event(
    author: UserRef,
    content: &str,
    attachments: Vec<Attachment>,
) -> Option<InboundEvent> {
    if content.trim().is_empty() && attachments.is_empty() {
        return None;
    }
    Some(InboundEvent::direct_message(author, content).with_attachments(attachments))
}

/// event for a guild message; command invocations and empty messages are skipped
fn guild_message_event(
    prefix: &str,
    channel_id: u64,
    author: UserRef,
    message_id: u64,
    content: &str,
    attachments: Vec<Attachment>,
) -> Option<InboundEvent> {
    if content.trim().is_empty() && attachments.is_empty() {
        return None;
    }
    if !prefix.is_empty() && content.starts_with(prefix) {
        return None;
    }
    let mut event = InboundEvent::channel_message(channel_id, author, content).with_attachments(attachments);
    if let InboundEvent::ChannelMessageReceived { message_id: id, .. } = &mut event {
        *id = Some(message_id.into());
    }
    Some(event)
}

/// close the ticket in this channel
#[poise::command(slash_command, prefix_command, guild_only)]
async fn close(ctx: Context<'_>) -> std::result::Result<(), DiscordError> {
    if !is_staff(&ctx).await {
        ctx.send(
            poise::CreateReply::default()
                .content("only staff can close tickets.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let event = InboundEvent::close(ctx.channel_id().get(), user_ref(ctx.author()));
    if let Err(e) = ctx.data().bus.publish(event) {
        error!("failed to publish close request: {}", e);
        ctx.say("modmail is shutting down, try again later.").await?;
        return Ok(());
    }

    ctx.send(
        poise::CreateReply::default()
            .content("closing ticket…")
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// send a message to a user directly
#[poise::command(slash_command, prefix_command, guild_only)]
async fn reply(
    ctx: Context<'_>,
    #[description = "user to message"] user: serenity::User,
    #[description = "message to send"]
    #[rest]
    message: String,
) -> std::result::Result<(), DiscordError> {
    if !is_staff(&ctx).await {
        ctx.send(
            poise::CreateReply::default()
                .content("only staff can reply to users.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let event = InboundEvent::StaffReplyRequested {
        channel_id: ctx.channel_id().get().into(),
        staff: user_ref(ctx.author()),
        user_id: UserId(user.id.get()),
        content: message,
    };
    if let Err(e) = ctx.data().bus.publish(event) {
        error!("failed to publish staff reply: {}", e);
        ctx.say("modmail is shutting down, try again later.").await?;
        return Ok(());
    }

    ctx.send(
        poise::CreateReply::default()
            .content(format!("sending to {}…", user.name))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

struct ModmailHandler {
    bus: EventBus,
    guild_id: serenity::GuildId,
    prefix: String,
    staff_role: Option<u64>,
}

#[serenity::async_trait]
impl serenity::EventHandler for ModmailHandler {
    async fn message(&self, _ctx: serenity::Context, new_message: serenity::Message) {
        if new_message.author.bot {
            return;
        }

        let author = user_ref(&new_message.author);
        let attachments = attachments_of(&new_message);

        let event = match new_message.guild_id {
            None => direct_message_event(author, &new_message.content, attachments),
            Some(guild_id) if guild_id == self.guild_id => guild_message_event(
                &self.prefix,
                new_message.channel_id.get(),
                author,
                new_message.id.get(),
                &new_message.content,
                attachments,
            ),
            Some(other) => {
                debug!("ignoring message from unmanaged guild {}", other);
                None
            }
        };

        let Some(event) = event else {
            return;
        };

        debug!(
            "discord {} from {} in {}",
            event.kind(),
            new_message.author.name,
            new_message.channel_id
        );
        if let Err(e) = self.bus.publish(event) {
            error!("failed to publish discord message to bus: {}", e);
        }
    }

    async fn interaction_create(&self, ctx: serenity::Context, interaction: serenity::Interaction) {
        let serenity::Interaction::Component(component) = interaction else {
            return;
        };
        if !is_close_button(&component.data.custom_id) {
            return;
        }

        let roles = component
            .member
            .as_ref()
            .map(|m| m.roles.clone())
            .unwrap_or_default();
        if !has_staff_role(self.staff_role, &roles) {
            let response = serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content("only staff can close tickets.")
                    .ephemeral(true),
            );
            if let Err(e) = component.create_response(&ctx, response).await {
                warn!("failed to answer close button: {}", e);
            }
            return;
        }

        if let Err(e) = component
            .create_response(&ctx, serenity::CreateInteractionResponse::Acknowledge)
            .await
        {
            warn!("failed to acknowledge close button: {}", e);
        }

        let event = InboundEvent::close(component.channel_id.get(), user_ref(&component.user));
        if let Err(e) = self.bus.publish(event) {
            error!("failed to publish close action to bus: {}", e);
        }
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<()> {
        if self.config.discord.token.is_empty() {
            return Err(ChannelError::NotConfigured("Discord".to_string()).into());
        }

        info!("starting discord bot");

        let config = self.config.clone();
        let bus = self.bus.clone();
        let guild_id = serenity::GuildId::new(config.discord.guild_id);

        let intents = serenity::GatewayIntents::non_privileged()
            | serenity::GatewayIntents::MESSAGE_CONTENT
            | serenity::GatewayIntents::GUILD_MESSAGES
            | serenity::GatewayIntents::DIRECT_MESSAGES;

        let bus_setup = bus.clone();
        let config_setup = config.clone();

        let framework = poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: vec![close(), reply()],
                prefix_options: poise::PrefixFrameworkOptions {
                    prefix: Some(config.discord.command_prefix.clone()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .setup(move |ctx, ready, framework| {
                let bus = bus_setup.clone();
                let config = config_setup.clone();
                Box::pin(async move {
                    info!("discord bot connected as {}", ready.user.name);

                    if let Err(e) = poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        guild_id,
                    )
                    .await
                    {
                        error!("failed to register discord commands in guild {}: {}", guild_id, e);
                    } else {
                        info!("registered discord slash commands in guild {}", guild_id);
                    }

                    Ok(Data { bus, config })
                })
            })
            .build();

        let handler = ModmailHandler {
            bus,
            guild_id,
            prefix: config.discord.command_prefix.clone(),
            staff_role: config.tickets.staff_role_id,
        };

        let mut client = serenity::ClientBuilder::new(&config.discord.token, intents)
            .framework(framework)
            .event_handler(handler)
            .await
            .map_err(|e| ChannelError::ConnectionFailed(format!("discord client error: {}", e)))?;

        *self.shard_manager.write().await = Some(client.shard_manager.clone());

        info!("discord bot started, waiting for messages...");
        client.start().await.map_err(|e| {
            error!("discord client error: {}", e);
            ChannelError::ConnectionFailed(format!("discord client error: {}", e))
        })?;

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("stopping discord bot");
        if let Some(shard_manager) = self.shard_manager.write().await.take() {
            shard_manager.shutdown_all().await;
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        !self.config.discord.token.is_empty()
    }
}
