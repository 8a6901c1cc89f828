use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LeaseError;

/// Identity a client claims when asking for a ticket.
///
/// Clients send their process id. The server never checks it against the
/// datagram's source; it is only used for matching tickets and for the
/// liveness probe. Zero is not a valid identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderId(u32);

impl HolderId {
    /// Returns `None` for zero.
    pub fn new(raw: u32) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HolderId {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || LeaseError::MalformedRequest {
            detail: format!("bad holder id '{}'", s),
        };

        // `u32::from_str` accepts a leading '+', the wire format does not.
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let raw: u32 = s.parse().map_err(|_| malformed())?;
        HolderId::new(raw).ok_or_else(malformed)
    }
}
