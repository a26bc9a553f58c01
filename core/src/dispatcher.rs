//! Event dispatch loop
//!
//! Pulls inbound events off the bus one at a time and hands them to the
//! ticket router. A failed event is logged and reported by the router; the
//! loop itself only stops when every bus sender is gone.

use crate::bus::{EventReceiver, InboundEvent};
use crate::error::RelayError;
use crate::messages::{OutgoingMessage, Target};
use crate::ticket::{CloseResult, ClosedTicket, DeliveryResult, TicketRouter};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) const NOT_A_TICKET_NOTICE: &str = "this can only be used in a ticket channel.";

/// What handling one event amounted to
#[derive(Debug)]
pub enum EventOutcome {
    /// A message was relayed or sent
    Delivered,
    /// The event did not concern any ticket
    Ignored,
    /// A ticket was closed
    Closed(ClosedTicket),
    /// Close was requested outside a ticket channel
    NotATicket,
    /// The event could not be carried out
    Failed(RelayError),
}

impl EventOutcome {
    fn from_delivery(result: DeliveryResult) -> Self {
        match result.failure {
            Some(err) => EventOutcome::Failed(err),
            None if result.channel_id.is_none() => EventOutcome::Ignored,
            None => EventOutcome::Delivered,
        }
    }
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub ignored: u64,
    pub failed: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: &EventOutcome) {
        self.handled += 1;
        match outcome {
            EventOutcome::Ignored | EventOutcome::NotATicket => self.ignored += 1,
            EventOutcome::Failed(_) => self.failed += 1,
            EventOutcome::Delivered | EventOutcome::Closed(_) => {}
        }
    }
}

/// Sequential consumer of the event bus
pub struct Dispatcher {
    router: Arc<TicketRouter>,
    receiver: EventReceiver,
}

impl Dispatcher {
    pub fn new(router: Arc<TicketRouter>, receiver: EventReceiver) -> Self {
        Self { router, receiver }
    }

    /// Handle events in arrival order until the bus closes
    pub async fn run(mut self) -> DispatchStats {
        info!("dispatcher started");
        let mut stats = DispatchStats::default();

        while let Some(event) = self.receiver.recv().await {
            let outcome = handle_event(&self.router, event).await;
            if let EventOutcome::Failed(err) = &outcome {
                warn!("event failed: {}", err);
            }
            stats.record(&outcome);
        }

        info!(
            "dispatcher stopped after {} events ({} failed)",
            stats.handled, stats.failed
        );
        stats
    }
}

fn log_queue_delay(kind: &str, received_at: DateTime<Utc>) {
    let waited = Utc::now().signed_duration_since(received_at);
    debug!("{} waited {} ms in queue", kind, waited.num_milliseconds());
}

/// Route a single event through the ticket router
pub async fn handle_event(router: &TicketRouter, event: InboundEvent) -> EventOutcome {
    debug!("dispatching {} event", event.kind());

    match event {
        InboundEvent::DirectMessageReceived {
            user,
            content,
            attachments,
            received_at,
        } => {
            log_queue_delay("direct message", received_at);
            EventOutcome::from_delivery(
                router
                    .route_inbound_direct_message(&user, &content, &attachments)
                    .await,
            )
        }
        InboundEvent::ChannelMessageReceived {
            channel_id,
            author,
            message_id,
            content,
            attachments,
            received_at,
        } => {
            log_queue_delay("channel message", received_at);
            EventOutcome::from_delivery(
                router
                    .route_inbound_channel_message(channel_id, &author, message_id, &content, &attachments)
                    .await,
            )
        }
        InboundEvent::CloseActionInvoked { channel_id, actor } => {
            match router.close_ticket(channel_id, &actor).await {
                CloseResult::Closed(closed) => EventOutcome::Closed(closed),
                CloseResult::NotATicket => {
                    let notice = OutgoingMessage::notice(NOT_A_TICKET_NOTICE);
                    if let Err(err) = router
                        .platform()
                        .send_message(Target::Channel(channel_id), notice)
                        .await
                    {
                        debug!("could not answer close in {}: {}", channel_id, err);
                    }
                    EventOutcome::NotATicket
                }
            }
        }
        InboundEvent::StaffReplyRequested {
            channel_id,
            staff,
            user_id,
            content,
        } => EventOutcome::from_delivery(
            router
                .reply_to_user(channel_id, &staff, user_id, &content)
                .await,
        ),
    }
}
