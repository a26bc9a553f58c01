//! Ticket router: owns the routing table and drives the ticket lifecycle
//!
//! Per user the lifecycle is `NO_TICKET -> OPEN -> CLOSED -> NO_TICKET`.
//! A ticket opens on the first direct message (or when its recorded channel
//! has disappeared), and closes when staff close it. Closing removes it from
//! the table before the channel is scheduled for deletion.

use super::naming::channel_name;
use super::table::{RoutingTable, Ticket};
use crate::channels::{ChatPlatform, OverrideTarget, PermissionOverride};
use crate::config::Config;
use crate::error::{PlatformError, RelayError};
use crate::messages::{Attribution, OutgoingMessage, Target};
use crate::types::{Attachment, ChannelId, FileUpload, MessageId, RoleId, UserId, UserRef};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub(crate) const TICKET_OPENED_NOTICE: &str =
    "ticket created. our staff team will respond when they are available, please be patient!";
pub(crate) const TICKET_FAILED_NOTICE: &str =
    "sorry, your ticket could not be opened right now. please try again later.";
pub(crate) const RELAY_FAILED_NOTICE: &str =
    "your message could not be delivered to staff. please send it again.";
pub(crate) const TICKET_CLOSED_NOTICE: &str = "your ticket with staff was closed. contact us again if needed! \
     sending a new message will open a new ticket.";
pub(crate) const DM_REFUSED_NOTICE: &str =
    "could not deliver the message to this user. they might have DMs disabled.";

/// Largest attachment re-uploaded under a relay; bigger files are linked
pub(crate) const MAX_REHOST_BYTES: u64 = 25 * 1024 * 1024;

pub(crate) const DELIVERED_REACTION: &str = "✅";
pub(crate) const REFUSED_REACTION: &str = "❌";

/// Router settings derived from the config
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Category ticket channels are created under
    pub category: ChannelId,
    /// Role that gets access to ticket channels
    pub staff_role: Option<RoleId>,
    /// Prefix for ticket channel names
    pub channel_prefix: String,
    /// Grace delay between close and channel deletion
    pub close_delay: Duration,
}

impl From<&Config> for RouterSettings {
    fn from(config: &Config) -> Self {
        Self {
            category: config.tickets.category(),
            staff_role: config.tickets.staff_role(),
            channel_prefix: config.tickets.channel_prefix.clone(),
            close_delay: Duration::from_secs(config.tickets.close_delay_secs),
        }
    }
}

/// Outcome of relaying one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Ticket channel the message was routed through, `None` if ignored or
    /// no ticket could be opened
    pub channel_id: Option<ChannelId>,
    /// Whether this message opened the ticket
    pub created: bool,
    /// Why delivery failed, if it did
    pub failure: Option<RelayError>,
}

impl DeliveryResult {
    fn delivered(channel_id: ChannelId, created: bool) -> Self {
        Self {
            channel_id: Some(channel_id),
            created,
            failure: None,
        }
    }

    fn failed(channel_id: Option<ChannelId>, created: bool, failure: RelayError) -> Self {
        Self {
            channel_id,
            created,
            failure: Some(failure),
        }
    }

    /// Not a ticket channel; nothing was sent anywhere
    pub fn ignored() -> Self {
        Self {
            channel_id: None,
            created: false,
            failure: None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.channel_id.is_some() && self.failure.is_none()
    }

    pub fn is_ignored(&self) -> bool {
        self.channel_id.is_none() && self.failure.is_none()
    }
}

/// A ticket that was just closed
#[derive(Debug)]
pub struct ClosedTicket {
    pub ticket: Ticket,
    pub closed_by: UserRef,
    /// Whether the closing notice reached the user
    pub user_notified: bool,
    /// Pending deferred deletion, `None` if the channel was deleted inline
    pub deletion: Option<JoinHandle<()>>,
}

/// Outcome of a close action
#[derive(Debug)]
pub enum CloseResult {
    Closed(ClosedTicket),
    NotATicket,
}

impl CloseResult {
    pub fn is_closed(&self) -> bool {
        matches!(self, CloseResult::Closed(_))
    }
}

/// Routes inbound messages between users and their ticket channels
pub struct TicketRouter {
    platform: Arc<dyn ChatPlatform>,
    settings: RouterSettings,
    table: Mutex<RoutingTable>,
    /// Per-user locks serialising ticket creation
    creating: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl TicketRouter {
    /// Create a router with an empty table
    pub fn new(platform: Arc<dyn ChatPlatform>, settings: RouterSettings) -> Self {
        Self {
            platform,
            settings,
            table: Mutex::new(RoutingTable::new()),
            creating: Mutex::new(HashMap::new()),
        }
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    /// Open ticket owned by `user_id`
    pub async fn lookup_by_user(&self, user_id: UserId) -> Option<Ticket> {
        self.table.lock().await.get_by_user(user_id).cloned()
    }

    /// Open ticket bound to `channel_id`
    pub async fn lookup_by_channel(&self, channel_id: ChannelId) -> Option<Ticket> {
        self.table.lock().await.get_by_channel(channel_id).cloned()
    }

    /// All open tickets, oldest first
    pub async fn open_tickets(&self) -> Vec<Ticket> {
        self.table.lock().await.snapshot()
    }

    pub async fn open_ticket_count(&self) -> usize {
        self.table.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn table_is_consistent(&self) -> bool {
        self.table.lock().await.is_consistent()
    }

    /// Relay a user's direct message into their ticket, opening one if needed
    pub async fn route_inbound_direct_message(
        &self,
        user: &UserRef,
        content: &str,
        attachments: &[Attachment],
    ) -> DeliveryResult {
        let (channel_id, created) = match self.get_or_create_ticket(user).await {
            Ok(resolved) => resolved,
            Err(err) => {
                // a kept record means the ticket exists and only this message was lost
                let has_ticket = self.lookup_by_user(user.id).await.is_some();
                let notice = if has_ticket {
                    error!("could not resolve ticket channel for user {}: {}", user.id, err);
                    RELAY_FAILED_NOTICE
                } else {
                    error!("could not open ticket for user {}: {}", user.id, err);
                    TICKET_FAILED_NOTICE
                };
                self.notify_best_effort(Target::User(user.id), notice).await;
                return DeliveryResult::failed(None, false, err);
            }
        };

        let files = self.rehost_attachments(attachments).await;
        let message = OutgoingMessage::relay(
            Attribution::User(user.clone()),
            with_unhosted_links(content, &files.failed),
        )
        .with_files(files.uploaded);

        match self
            .platform
            .send_message(Target::Channel(channel_id), message)
            .await
        {
            Ok(_) => {
                debug!("relayed dm from {} into channel {}", user.id, channel_id);
                DeliveryResult::delivered(channel_id, created)
            }
            Err(err) => {
                warn!("failed to relay dm from {} into channel {}: {}", user.id, channel_id, err);
                if err.is_not_found() {
                    self.reconcile(user.id, channel_id).await;
                }
                self.notify_best_effort(Target::User(user.id), RELAY_FAILED_NOTICE)
                    .await;
                DeliveryResult::failed(Some(channel_id), created, err.into())
            }
        }
    }

    /// Relay a staff message from a ticket channel to the owning user
    ///
    /// Messages in channels that are not bound to an open ticket are ignored
    /// without any platform call.
    pub async fn route_inbound_channel_message(
        &self,
        channel_id: ChannelId,
        author: &UserRef,
        message_id: Option<MessageId>,
        content: &str,
        attachments: &[Attachment],
    ) -> DeliveryResult {
        let owner = self
            .table
            .lock()
            .await
            .get_by_channel(channel_id)
            .map(|ticket| ticket.user_id);
        let Some(user_id) = owner else {
            debug!("ignoring message in non-ticket channel {}", channel_id);
            return DeliveryResult::ignored();
        };

        let files = self.rehost_attachments(attachments).await;
        let message = OutgoingMessage::relay(
            Attribution::Staff(author.clone()),
            with_unhosted_links(content, &files.failed),
        )
        .with_files(files.uploaded);

        match self.platform.send_message(Target::User(user_id), message).await {
            Ok(_) => {
                debug!("relayed staff reply in {} to user {}", channel_id, user_id);
                self.react_best_effort(channel_id, message_id, DELIVERED_REACTION)
                    .await;
                DeliveryResult::delivered(channel_id, false)
            }
            Err(err) => {
                warn!("failed to deliver staff reply to user {}: {}", user_id, err);
                self.notify_best_effort(Target::Channel(channel_id), DM_REFUSED_NOTICE)
                    .await;
                self.react_best_effort(channel_id, message_id, REFUSED_REACTION)
                    .await;
                DeliveryResult::failed(Some(channel_id), false, err.into())
            }
        }
    }

    /// Close the ticket bound to `channel_id`
    ///
    /// The ticket leaves the table first; notices are best-effort and the
    /// channel is deleted last, possibly after the configured delay.
    pub async fn close_ticket(&self, channel_id: ChannelId, closed_by: &UserRef) -> CloseResult {
        let removed = self.table.lock().await.remove_by_channel(channel_id);
        let Some(ticket) = removed else {
            info!("close requested in non-ticket channel {}", channel_id);
            return CloseResult::NotATicket;
        };

        info!(
            "ticket for user {} in channel {} closed by {}",
            ticket.user_id, channel_id, closed_by.name
        );

        let user_notified = match self
            .platform
            .send_message(
                Target::User(ticket.user_id),
                OutgoingMessage::notice(TICKET_CLOSED_NOTICE),
            )
            .await
        {
            Ok(_) => true,
            Err(err) => {
                debug!("closing notice to user {} not delivered: {}", ticket.user_id, err);
                false
            }
        };

        let staff_notice = format!(
            "ticket closed by {}. this channel will be deleted shortly.",
            closed_by.name
        );
        self.notify_best_effort(Target::Channel(channel_id), &staff_notice)
            .await;

        let deletion = self.schedule_deletion(channel_id).await;

        CloseResult::Closed(ClosedTicket {
            ticket,
            closed_by: closed_by.clone(),
            user_notified,
            deletion,
        })
    }

    /// Send a staff message to any user, outside of the ticket flow
    ///
    /// A confirmation or a refusal notice is posted in `channel_id`. The
    /// routing table is not touched.
    pub async fn reply_to_user(
        &self,
        channel_id: ChannelId,
        staff: &UserRef,
        user_id: UserId,
        content: &str,
    ) -> DeliveryResult {
        let message = OutgoingMessage::relay(Attribution::Staff(staff.clone()), content);
        match self.platform.send_message(Target::User(user_id), message).await {
            Ok(_) => {
                let confirm = format!("reply sent to <@{}>.", user_id);
                self.notify_best_effort(Target::Channel(channel_id), &confirm)
                    .await;
                DeliveryResult::delivered(channel_id, false)
            }
            Err(err) => {
                warn!("direct reply from {} to user {} failed: {}", staff.name, user_id, err);
                self.notify_best_effort(Target::Channel(channel_id), DM_REFUSED_NOTICE)
                    .await;
                DeliveryResult::failed(Some(channel_id), false, err.into())
            }
        }
    }

    /// Resolve the user's open ticket, creating a channel if there is none
    async fn get_or_create_ticket(&self, user: &UserRef) -> Result<(ChannelId, bool), RelayError> {
        if let Some(channel_id) = self.live_channel_for(user.id).await? {
            return Ok((channel_id, false));
        }

        let lock = self.creation_lock(user.id).await;
        let guard = lock.lock().await;

        // another event for this user may have opened the ticket while we waited
        let result = match self.live_channel_for(user.id).await {
            Ok(Some(channel_id)) => Ok((channel_id, false)),
            Ok(None) => self.open_ticket(user).await.map(|id| (id, true)),
            Err(err) => Err(err),
        };

        drop(guard);
        drop(lock);
        self.release_creation_lock(user.id).await;
        result
    }

    /// Channel of the user's open ticket, if it still exists
    ///
    /// A recorded channel that is gone on the platform is dropped from the
    /// table.
    async fn live_channel_for(&self, user_id: UserId) -> Result<Option<ChannelId>, RelayError> {
        let recorded = self
            .table
            .lock()
            .await
            .get_by_user(user_id)
            .map(|ticket| ticket.channel_id);
        let Some(channel_id) = recorded else {
            return Ok(None);
        };

        match self.platform.channel_exists(channel_id).await {
            Ok(true) => Ok(Some(channel_id)),
            Ok(false) => {
                self.reconcile(user_id, channel_id).await;
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn open_ticket(&self, user: &UserRef) -> Result<ChannelId, RelayError> {
        let name = channel_name(&self.settings.channel_prefix, &user.name, user.id);
        let overrides = self.channel_overrides();

        let channel_id = self
            .platform
            .create_sub_channel(&name, self.settings.category, &overrides)
            .await?;

        let inserted = self
            .table
            .lock()
            .await
            .insert(Ticket::open(user.id, user.name.clone(), channel_id));
        if let Err(conflict) = inserted {
            error!("ticket table rejected channel {}: {}", channel_id, conflict);
            if let Err(err) = self.platform.delete_channel(channel_id).await {
                warn!("failed to remove orphan channel {}: {}", channel_id, err);
            }
            return Err(PlatformError::Other(conflict.to_string()).into());
        }

        info!(
            "opened ticket for user {} in {} channel {} ({})",
            user.id,
            self.platform.name(),
            channel_id,
            name
        );

        let intro = OutgoingMessage::notice(format!(
            "new ticket created by <@{}> ({})",
            user.id, user.name
        ))
        .with_close_button();
        self.send_best_effort(Target::Channel(channel_id), intro).await;
        self.notify_best_effort(Target::User(user.id), TICKET_OPENED_NOTICE)
            .await;

        Ok(channel_id)
    }

    fn channel_overrides(&self) -> Vec<PermissionOverride> {
        let mut overrides = vec![PermissionOverride::hidden(OverrideTarget::Everyone)];
        if let Some(role) = self.settings.staff_role {
            overrides.push(PermissionOverride::read_write(OverrideTarget::Role(role)));
        }
        overrides.push(PermissionOverride::read_write(OverrideTarget::Bot));
        overrides
    }

    async fn creation_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.creating
            .lock()
            .await
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_creation_lock(&self, user_id: UserId) {
        let mut creating = self.creating.lock().await;
        let idle = creating
            .get(&user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            creating.remove(&user_id);
        }
    }

    /// Forget a ticket whose channel has disappeared
    async fn reconcile(&self, user_id: UserId, channel_id: ChannelId) {
        if self
            .table
            .lock()
            .await
            .remove_pair(user_id, channel_id)
            .is_some()
        {
            info!(
                "channel {} for user {} no longer exists, ticket dropped",
                channel_id, user_id
            );
        }
    }

    async fn schedule_deletion(&self, channel_id: ChannelId) -> Option<JoinHandle<()>> {
        let delay = self.settings.close_delay;
        if delay.is_zero() {
            delete_channel_logged(self.platform.as_ref(), channel_id).await;
            return None;
        }

        let platform = Arc::clone(&self.platform);
        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            delete_channel_logged(platform.as_ref(), channel_id).await;
        }))
    }

    async fn rehost_attachments(&self, attachments: &[Attachment]) -> Rehosted {
        let mut rehosted = Rehosted::default();
        for attachment in attachments {
            if attachment.size > MAX_REHOST_BYTES {
                debug!(
                    "attachment {} is {} bytes, linking instead of uploading",
                    attachment.filename, attachment.size
                );
                rehosted.failed.push(attachment.url.clone());
                continue;
            }
            match self.platform.fetch_attachment_bytes(attachment).await {
                Ok(data) => rehosted.uploaded.push(FileUpload {
                    filename: attachment.filename.clone(),
                    data,
                }),
                Err(err) => {
                    warn!("could not fetch attachment {}: {}", attachment.url, err);
                    rehosted.failed.push(attachment.url.clone());
                }
            }
        }
        rehosted
    }

    async fn notify_best_effort(&self, target: Target, text: &str) {
        self.send_best_effort(target, OutgoingMessage::notice(text)).await;
    }

    async fn send_best_effort(&self, target: Target, message: OutgoingMessage) {
        if let Err(err) = self.platform.send_message(target, message).await {
            debug!("notice to {:?} not delivered: {}", target, err);
        }
    }

    async fn react_best_effort(
        &self,
        channel_id: ChannelId,
        message_id: Option<MessageId>,
        emoji: &str,
    ) {
        let Some(message_id) = message_id else {
            return;
        };
        if let Err(err) = self.platform.add_reaction(channel_id, message_id, emoji).await {
            debug!("could not react to message {}: {}", message_id, err);
        }
    }
}

/// Attachments ready for upload, plus links to the ones that failed
#[derive(Default)]
struct Rehosted {
    uploaded: Vec<FileUpload>,
    failed: Vec<String>,
}

fn with_unhosted_links(content: &str, failed: &[String]) -> String {
    if failed.is_empty() {
        return content.to_string();
    }
    let mut text = content.to_string();
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str(&failed.join("\n"));
    text
}

async fn delete_channel_logged(platform: &dyn ChatPlatform, channel_id: ChannelId) {
    match platform.delete_channel(channel_id).await {
        Ok(()) => info!("deleted ticket channel {}", channel_id),
        Err(err) => warn!("failed to delete ticket channel {}: {}", channel_id, err),
    }
}
