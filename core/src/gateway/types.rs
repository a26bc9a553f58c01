//! Response bodies for the HTTP status gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::Ticket;
use crate::types::{ChannelId, UserId};

/// GET /health response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" while the process is serving
    pub status: String,
    /// Number of tickets currently open
    pub open_tickets: usize,
}

impl HealthResponse {
    pub fn ok(open_tickets: usize) -> Self {
        Self {
            status: "ok".to_string(),
            open_tickets,
        }
    }
}

/// One entry of GET /tickets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSummary {
    pub user_id: UserId,
    pub user_name: String,
    pub channel_id: ChannelId,
    pub opened_at: DateTime<Utc>,
}

impl From<&Ticket> for TicketSummary {
    fn from(ticket: &Ticket) -> Self {
        Self {
            user_id: ticket.user_id,
            user_name: ticket.user_name.clone(),
            channel_id: ticket.channel_id,
            opened_at: ticket.opened_at,
        }
    }
}

/// GET /tickets response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketList {
    pub tickets: Vec<TicketSummary>,
}
