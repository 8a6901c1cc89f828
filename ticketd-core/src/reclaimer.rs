//! Periodic sweep that frees tickets held by dead clients.
//!
//! The reclaimer owns a single-shot deadline. Whoever drives it waits until
//! [`Reclaimer::next_due`], then calls [`Reclaimer::sweep`]; the sweep itself
//! re-arms the deadline before returning, so a driver loop cannot forget to.

use std::time::{Duration, Instant};

use crate::events::{EventKind, EventSink, LeaseEvent};
use crate::liveness::LivenessProbe;
use crate::table::LeaseTable;
use crate::types::Ticket;

pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimerState {
    /// Waiting for the deadline
    Idle,
    /// Walking the lease table
    Sweeping,
}

#[derive(Debug, Clone)]
pub struct Reclaimer {
    interval: Duration,
    state: ReclaimerState,
    next_due: Instant,
    sweeps: u64,
}

impl Reclaimer {
    /// Create an idle reclaimer whose first sweep is due one interval after `now`.
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            state: ReclaimerState::Idle,
            next_due: now + interval,
            sweeps: 0,
        }
    }

    pub fn state(&self) -> ReclaimerState {
        self.state
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Number of sweeps completed so far.
    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    /// Run one sweep and re-arm for `now + interval`.
    pub fn sweep(
        &mut self,
        table: &mut LeaseTable,
        probe: &dyn LivenessProbe,
        sink: &dyn EventSink,
        now: Instant,
    ) -> Vec<Ticket> {
        self.state = ReclaimerState::Sweeping;

        let reclaimed = table.reclaim_dead(probe);
        for ticket in &reclaimed {
            sink.record(LeaseEvent::new(
                EventKind::Reclaimed,
                format!("freeing {}", ticket),
                None,
            ));
        }

        if let Err(err) = table.check_consistency() {
            sink.record(LeaseEvent::new(EventKind::CorruptState, err.to_string(), None));
        }

        self.sweeps += 1;
        self.next_due = now + self.interval;
        self.state = ReclaimerState::Idle;

        reclaimed
    }
}
