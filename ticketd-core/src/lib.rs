//! # ticketd-core
//!
//! The lease kernel of the ticketd license server: a fixed pool of exclusive
//! tickets, the datagram protocol that grants and returns them, and the
//! reclaimer that frees tickets left behind by dead clients.

pub mod error;
pub mod events;
pub mod liveness;
pub mod protocol;
pub mod reclaimer;
pub mod table;
pub mod types;

#[cfg(test)]
mod reclaimer_test;
