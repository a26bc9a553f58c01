//! HTTP status gateway for modmail
//!
//! Small keep-alive server for hosts that expect a bound port, plus a
//! read-only view of the open tickets.
//!
//! # Endpoints
//!
//! | Method | Path       | Description                        |
//! |--------|------------|------------------------------------|
//! | GET    | `/`        | Plain-text liveness message        |
//! | GET    | `/health`  | Status and open ticket count       |
//! | GET    | `/tickets` | Open tickets, oldest first         |

pub mod types;

use std::{net::SocketAddr, sync::Arc};

use axum::{Json, Router, extract::State, routing::get};
use tracing::info;

use crate::ticket::TicketRouter;

use types::{HealthResponse, TicketList, TicketSummary};

#[derive(Clone)]
pub struct GatewayState {
    router: Arc<TicketRouter>,
}

/// The HTTP gateway server.
pub struct GatewayServer {
    router: Arc<TicketRouter>,
    host: String,
    port: u16,
}

impl GatewayServer {
    pub fn new(router: Arc<TicketRouter>, host: impl Into<String>, port: u16) -> Self {
        Self {
            router,
            host: host.into(),
            port,
        }
    }

    /// Build the axum app without binding a socket
    pub fn app(&self) -> Router {
        let state = GatewayState {
            router: self.router.clone(),
        };
        Router::new()
            .route("/", get(handle_root))
            .route("/health", get(handle_health))
            .route("/tickets", get(handle_tickets))
            .with_state(state)
    }

    /// Start the HTTP server. Runs until the process is stopped.
    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.app();

        let addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("HTTP gateway listening on http://{}", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn handle_root() -> &'static str {
    "modmail is running"
}

async fn handle_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(state.router.open_ticket_count().await))
}

async fn handle_tickets(State(state): State<GatewayState>) -> Json<TicketList> {
    let tickets = state
        .router
        .open_tickets()
        .await
        .iter()
        .map(TicketSummary::from)
        .collect();
    Json(TicketList { tickets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::mock::MockPlatform;
    use crate::ticket::RouterSettings;
    use crate::types::{ChannelId, UserId, UserRef};
    use std::time::Duration;

    fn state() -> GatewayState {
        let settings = RouterSettings {
            category: ChannelId(1),
            staff_role: None,
            channel_prefix: "ticket".to_string(),
            close_delay: Duration::ZERO,
        };
        let router = TicketRouter::new(Arc::new(MockPlatform::new()), settings);
        GatewayState {
            router: Arc::new(router),
        }
    }

    #[tokio::test]
    async fn test_root_message() {
        assert_eq!(handle_root().await, "modmail is running");
    }

    #[tokio::test]
    async fn test_health_counts_open_tickets() {
        let state = state();
        let Json(health) = handle_health(State(state.clone())).await;
        assert_eq!(health, HealthResponse::ok(0));

        state
            .router
            .route_inbound_direct_message(&UserRef::new(7, "mira"), "hi", &[])
            .await;
        let Json(health) = handle_health(State(state)).await;
        assert_eq!(health.open_tickets, 1);
    }

    #[tokio::test]
    async fn test_ticket_listing() {
        let state = state();
        state
            .router
            .route_inbound_direct_message(&UserRef::new(7, "mira"), "hi", &[])
            .await;

        let Json(list) = handle_tickets(State(state)).await;
        assert_eq!(list.tickets.len(), 1);
        assert_eq!(list.tickets[0].user_id, UserId(7));
        assert_eq!(list.tickets[0].user_name, "mira");
    }
}
