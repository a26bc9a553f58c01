//! Bidirectional routing table between users and ticket channels

use crate::types::{ChannelId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Lifecycle state of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketState {
    Open,
    Closed,
}

/// One conversation between an end user and staff
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub user_id: UserId,
    pub user_name: String,
    pub channel_id: ChannelId,
    pub state: TicketState,
    pub opened_at: DateTime<Utc>,
}

impl Ticket {
    /// Create an open ticket
    pub fn open(user_id: UserId, user_name: impl Into<String>, channel_id: ChannelId) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            channel_id,
            state: TicketState::Open,
            opened_at: Utc::now(),
        }
    }
}

/// Insert rejected because one side of the pair is already bound
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableConflict {
    #[error("user {0} already has an open ticket")]
    UserTaken(UserId),

    #[error("channel {0} already belongs to a ticket")]
    ChannelTaken(ChannelId),
}

/// All open tickets, indexed by user and by channel
///
/// Both indexes are only ever changed together, so
/// `get_by_user(u).channel_id == c` holds exactly when
/// `get_by_channel(c).user_id == u`.
#[derive(Debug, Default)]
pub struct RoutingTable {
    by_user: HashMap<UserId, Ticket>,
    by_channel: HashMap<ChannelId, UserId>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open ticket under both keys
    pub fn insert(&mut self, ticket: Ticket) -> Result<(), TableConflict> {
        if self.by_user.contains_key(&ticket.user_id) {
            return Err(TableConflict::UserTaken(ticket.user_id));
        }
        if self.by_channel.contains_key(&ticket.channel_id) {
            return Err(TableConflict::ChannelTaken(ticket.channel_id));
        }
        self.by_channel.insert(ticket.channel_id, ticket.user_id);
        self.by_user.insert(ticket.user_id, ticket);
        Ok(())
    }

    pub fn get_by_user(&self, user_id: UserId) -> Option<&Ticket> {
        self.by_user.get(&user_id)
    }

    pub fn get_by_channel(&self, channel_id: ChannelId) -> Option<&Ticket> {
        self.by_channel
            .get(&channel_id)
            .and_then(|user_id| self.by_user.get(user_id))
    }

    /// Remove the ticket bound to `channel_id`; the returned ticket is closed
    pub fn remove_by_channel(&mut self, channel_id: ChannelId) -> Option<Ticket> {
        let user_id = self.by_channel.remove(&channel_id)?;
        let mut ticket = self.by_user.remove(&user_id)?;
        ticket.state = TicketState::Closed;
        Some(ticket)
    }

    /// Remove the ticket owned by `user_id`; the returned ticket is closed
    pub fn remove_by_user(&mut self, user_id: UserId) -> Option<Ticket> {
        let mut ticket = self.by_user.remove(&user_id)?;
        self.by_channel.remove(&ticket.channel_id);
        ticket.state = TicketState::Closed;
        Some(ticket)
    }

    /// Remove the entry only if `user_id` is still bound to `channel_id`
    pub fn remove_pair(&mut self, user_id: UserId, channel_id: ChannelId) -> Option<Ticket> {
        match self.by_channel.get(&channel_id) {
            Some(owner) if *owner == user_id => self.remove_by_channel(channel_id),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    /// Snapshot of every open ticket, oldest first
    pub fn snapshot(&self) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self.by_user.values().cloned().collect();
        tickets.sort_by_key(|t| t.opened_at);
        tickets
    }

    /// Whether the two indexes describe the same bijection
    pub fn is_consistent(&self) -> bool {
        self.by_user.len() == self.by_channel.len()
            && self.by_user.iter().all(|(user_id, ticket)| {
                ticket.user_id == *user_id
                    && ticket.state == TicketState::Open
                    && self.by_channel.get(&ticket.channel_id) == Some(user_id)
            })
    }
}
