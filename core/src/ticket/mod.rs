//! Ticket lifecycle: routing table, channel naming and the router

pub mod naming;
pub mod router;
pub mod table;

#[cfg(test)]
mod tests;

pub use naming::channel_name;
pub use router::{CloseResult, ClosedTicket, DeliveryResult, RouterSettings, TicketRouter};
pub use table::{RoutingTable, TableConflict, Ticket, TicketState};
