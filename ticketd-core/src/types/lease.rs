use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::HolderId;
use crate::error::LeaseError;

/// State of a single slot in the lease table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "holder", rename_all = "snake_case")]
pub enum SlotState {
    /// Free to be granted
    Available,
    /// Granted to a holder
    Held(HolderId),
}

impl SlotState {
    pub fn holder(self) -> Option<HolderId> {
        match self {
            SlotState::Available => None,
            SlotState::Held(holder) => Some(holder),
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, SlotState::Available)
    }
}

/// Proof that `holder` was granted slot `slot`.
///
/// Serialized on the wire as `<holder>.<slot>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    pub holder: HolderId,
    pub slot: usize,
}

impl Ticket {
    pub fn new(holder: HolderId, slot: usize) -> Self {
        Self { holder, slot }
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.holder, self.slot)
    }
}

impl FromStr for Ticket {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LeaseError::InvalidTicket {
            ticket: s.to_string(),
        };

        let (holder, slot) = s.split_once('.').ok_or_else(invalid)?;
        let holder: HolderId = holder.parse().map_err(|_| invalid())?;
        if slot.is_empty() || !slot.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let slot: usize = slot.parse().map_err(|_| invalid())?;

        Ok(Ticket { holder, slot })
    }
}
