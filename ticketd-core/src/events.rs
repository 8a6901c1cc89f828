//! Observability sink for lease activity.

use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A ticket was granted
    Granted,
    /// HELLO refused because the pool is full
    Exhausted,
    /// HELLO refused because the holder already has a slot
    DuplicateHolder,
    /// A ticket was handed back
    Released,
    /// A ticket was checked and found valid
    Validated,
    /// A GBYE or VALD carried a bogus ticket
    InvalidTicket,
    /// Unrecognized or unparseable request
    InvalidRequest,
    /// The reclaimer freed a dead holder's slot
    Reclaimed,
    /// The table failed its consistency check
    CorruptState,
    /// A datagram could not be received or sent
    TransportError,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Granted => "granted",
            EventKind::Exhausted => "exhausted",
            EventKind::DuplicateHolder => "duplicate_holder",
            EventKind::Released => "released",
            EventKind::Validated => "validated",
            EventKind::InvalidTicket => "invalid_ticket",
            EventKind::InvalidRequest => "invalid_request",
            EventKind::Reclaimed => "reclaimed",
            EventKind::CorruptState => "corrupt_state",
            EventKind::TransportError => "transport_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseEvent {
    pub kind: EventKind,
    pub detail: String,
    pub source: Option<SocketAddr>,
}

impl LeaseEvent {
    pub fn new(kind: EventKind, detail: impl Into<String>, source: Option<SocketAddr>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            source,
        }
    }
}

/// Receives every lease event the server produces.
pub trait EventSink: Send + Sync {
    fn record(&self, event: LeaseEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: LeaseEvent) {
        let kind = event.kind.as_str();
        let source = event.source.map(|addr| addr.to_string()).unwrap_or_default();

        match event.kind {
            EventKind::CorruptState => {
                tracing::error!(
                    kind,
                    source = %source,
                    detail = %event.detail,
                    "Lease table corrupt"
                )
            }
            EventKind::TransportError => {
                tracing::warn!(kind, source = %source, detail = %event.detail, "Transport failure")
            }
            EventKind::InvalidTicket | EventKind::InvalidRequest => {
                tracing::warn!(kind, source = %source, detail = %event.detail, "Request rejected")
            }
            _ => tracing::info!(kind, source = %source, detail = %event.detail, "Lease event"),
        }
    }
}

/// Keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LeaseEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LeaseEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: LeaseEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
