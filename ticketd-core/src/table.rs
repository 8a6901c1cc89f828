use serde::{Deserialize, Serialize};

use crate::error::LeaseError;
use crate::liveness::LivenessProbe;
use crate::types::{HolderId, SlotState, Ticket};

pub const DEFAULT_CAPACITY: usize = 3;

/// Whether one holder may occupy more than one slot at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHolderPolicy {
    #[default]
    Allow,
    Reject,
}

/// What the table does after it has detected a counter/slot mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptStatePolicy {
    /// Keep granting tickets; the violation is only reported.
    #[default]
    Continue,
    /// Refuse every further acquire until restart. Release and validate still work.
    RefuseAcquire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub capacity: usize,
    pub duplicate_holders: DuplicateHolderPolicy,
    pub on_corrupt: CorruptStatePolicy,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            duplicate_holders: DuplicateHolderPolicy::default(),
            on_corrupt: CorruptStatePolicy::default(),
        }
    }
}

impl TableConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}

/// Point-in-time copy of the table, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    pub capacity: usize,
    pub outstanding: usize,
    pub refusing_acquire: bool,
    pub slots: Vec<SlotState>,
}

/// Fixed pool of exclusive ticket slots.
///
/// `outstanding` always equals the number of held slots unless something has
/// gone badly wrong; [`LeaseTable::check_consistency`] verifies it.
#[derive(Debug, Clone)]
pub struct LeaseTable {
    slots: Vec<SlotState>,
    outstanding: usize,
    config: TableConfig,
    refusing_acquire: bool,
}

impl LeaseTable {
    pub fn new(config: TableConfig) -> Self {
        Self {
            slots: vec![SlotState::Available; config.capacity],
            outstanding: 0,
            config,
            refusing_acquire: false,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(TableConfig::with_capacity(capacity))
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn slots(&self) -> &[SlotState] {
        &self.slots
    }

    pub fn is_refusing_acquire(&self) -> bool {
        self.refusing_acquire
    }

    /// Grant the lowest free slot to `holder`.
    pub fn acquire(&mut self, holder: HolderId) -> Result<Ticket, LeaseError> {
        if self.refusing_acquire {
            return Err(self.corrupt_error());
        }
        if self.outstanding >= self.capacity() {
            return Err(LeaseError::PoolExhausted {
                capacity: self.capacity(),
            });
        }
        if self.config.duplicate_holders == DuplicateHolderPolicy::Reject {
            if let Some(slot) = self.slot_of(holder) {
                return Err(LeaseError::HolderAlreadyLeased { holder, slot });
            }
        }

        let Some(slot) = self.slots.iter().position(|s| s.is_available()) else {
            // Counter says there is room, slots say otherwise.
            return Err(self.flag_corruption());
        };

        self.slots[slot] = SlotState::Held(holder);
        self.outstanding += 1;

        Ok(Ticket::new(holder, slot))
    }

    /// Hand a ticket back.
    pub fn release(&mut self, ticket: &Ticket) -> Result<(), LeaseError> {
        if !self.validate(ticket) {
            return Err(LeaseError::InvalidTicket {
                ticket: ticket.to_string(),
            });
        }

        self.slots[ticket.slot] = SlotState::Available;
        self.outstanding = self.outstanding.saturating_sub(1);
        Ok(())
    }

    /// True iff the slot exists and is held by the ticket's holder.
    pub fn validate(&self, ticket: &Ticket) -> bool {
        self.slots
            .get(ticket.slot)
            .is_some_and(|s| *s == SlotState::Held(ticket.holder))
    }

    /// Free every slot whose holder the probe reports dead.
    ///
    /// Returns the tickets that were freed, in slot order.
    pub fn reclaim_dead(&mut self, probe: &dyn LivenessProbe) -> Vec<Ticket> {
        let mut reclaimed = Vec::new();

        for (slot, state) in self.slots.iter_mut().enumerate() {
            let SlotState::Held(holder) = *state else {
                continue;
            };
            if probe.is_alive(holder) {
                continue;
            }
            *state = SlotState::Available;
            self.outstanding = self.outstanding.saturating_sub(1);
            reclaimed.push(Ticket::new(holder, slot));
        }

        reclaimed
    }

    /// Recount held slots and compare with the counter.
    pub fn check_consistency(&mut self) -> Result<(), LeaseError> {
        if self.held_count() == self.outstanding {
            Ok(())
        } else {
            Err(self.flag_corruption())
        }
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            capacity: self.capacity(),
            outstanding: self.outstanding,
            refusing_acquire: self.refusing_acquire,
            slots: self.slots.clone(),
        }
    }

    fn slot_of(&self, holder: HolderId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| *s == SlotState::Held(holder))
    }

    fn held_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_available()).count()
    }

    fn corrupt_error(&self) -> LeaseError {
        LeaseError::CorruptState {
            outstanding: self.outstanding,
            held: self.held_count(),
        }
    }

    fn flag_corruption(&mut self) -> LeaseError {
        if self.config.on_corrupt == CorruptStatePolicy::RefuseAcquire {
            self.refusing_acquire = true;
        }
        self.corrupt_error()
    }

    #[cfg(test)]
    pub(crate) fn force_outstanding(&mut self, outstanding: usize) {
        self.outstanding = outstanding;
    }
}

impl Default for LeaseTable {
    fn default() -> Self {
        Self::new(TableConfig::default())
    }
}
