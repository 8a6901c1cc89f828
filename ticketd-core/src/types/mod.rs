mod lease;
mod primitives;

pub use lease::{SlotState, Ticket};
pub use primitives::HolderId;
