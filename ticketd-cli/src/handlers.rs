use serde::Serialize;

use ticketd_core::table::TableSnapshot;
use ticketd_core::types::{SlotState, Ticket};

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub capacity: usize,
    pub outstanding: usize,
    pub refusing_acquire: bool,
    pub version: String,
}

impl HealthResponse {
    pub fn from_snapshot(snapshot: &TableSnapshot) -> Self {
        let status = if snapshot.refusing_acquire { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            capacity: snapshot.capacity,
            outstanding: snapshot.outstanding,
            refusing_acquire: snapshot.refusing_acquire,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SlotInfo {
    pub slot: usize,
    pub holder: Option<u32>,
    pub ticket: Option<String>,
}

impl SlotInfo {
    pub fn list(snapshot: &TableSnapshot) -> Vec<SlotInfo> {
        snapshot
            .slots
            .iter()
            .enumerate()
            .map(|(slot, state)| match state {
                SlotState::Available => SlotInfo {
                    slot,
                    holder: None,
                    ticket: None,
                },
                SlotState::Held(holder) => SlotInfo {
                    slot,
                    holder: Some(holder.get()),
                    ticket: Some(Ticket::new(*holder, slot).to_string()),
                },
            })
            .collect()
    }
}

#[derive(Serialize)]
pub struct ReclaimResponse {
    pub reclaimed: Vec<String>,
    pub outstanding: usize,
}
