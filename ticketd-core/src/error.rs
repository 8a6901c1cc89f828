//! Lease-table error types.

use thiserror::Error;

use crate::types::HolderId;

/// Errors surfaced by lease table and protocol operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    /// Every slot is held.
    #[error("no tickets available (capacity {capacity})")]
    PoolExhausted {
        /// Size of the pool.
        capacity: usize,
    },

    /// Unknown slot, holder mismatch, or unparseable ticket text.
    #[error("invalid ticket: {ticket}")]
    InvalidTicket {
        /// The ticket as received.
        ticket: String,
    },

    /// The request could not be parsed.
    #[error("malformed request: {detail}")]
    MalformedRequest {
        /// What was wrong with it.
        detail: String,
    },

    /// The holder already occupies a slot and duplicates are rejected.
    #[error("holder {holder} already holds slot {slot}")]
    HolderAlreadyLeased {
        /// The requesting holder.
        holder: HolderId,
        /// The slot it already holds.
        slot: usize,
    },

    /// Outstanding counter disagrees with the slots.
    #[error("lease table corrupt: counter says {outstanding} outstanding, slots say {held}")]
    CorruptState {
        /// Value of the outstanding counter.
        outstanding: usize,
        /// Number of slots actually held.
        held: usize,
    },
}
