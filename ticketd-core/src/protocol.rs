//! Wire protocol: request parsing, dispatch onto the lease table, reply text.
//!
//! Requests are single ASCII datagrams whose first four bytes pick the
//! command:
//!
//! | Request                 | Success                 | Failure                      |
//! |-------------------------|-------------------------|------------------------------|
//! | `HELLO <holder>`        | `TICK <holder>.<slot>`  | `FAIL no tickets available`  |
//! | `GBYE <holder>.<slot>`  | `THNX See ya!`          | `FAIL invalid ticket`        |
//! | `VALD <holder>.<slot>`  | `GOOD Valid ticket`     | `FAIL invalid ticket`        |
//! | anything else           |                         | `FAIL invalid request`       |
//!
//! A HELLO whose holder cannot be parsed gets the same reply as a full pool.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::LeaseError;
use crate::events::{EventKind, EventSink, LeaseEvent};
use crate::table::LeaseTable;
use crate::types::{HolderId, Ticket};

/// Largest datagram either side needs to handle.
pub const MAX_MESSAGE_LEN: usize = 128;

const CMD_HELLO: &str = "HELL";
const CMD_GOODBYE: &str = "GBYE";
const CMD_VALIDATE: &str = "VALD";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Hello(HolderId),
    Goodbye(Ticket),
    Validate(Ticket),
}

impl Request {
    /// Decode a datagram payload.
    ///
    /// A bad HELLO holder or an unknown command is `MalformedRequest`; a bad
    /// ticket on GBYE/VALD is `InvalidTicket`.
    pub fn parse(payload: &[u8]) -> Result<Self, LeaseError> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| LeaseError::MalformedRequest {
                detail: "payload is not ASCII".to_string(),
            })?
            .trim_end_matches(['\0', '\r', '\n']);

        let (command, arg) = match text.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (text, ""),
        };

        match command.get(..4) {
            Some(CMD_HELLO) => Ok(Request::Hello(arg.parse()?)),
            Some(CMD_GOODBYE) => Ok(Request::Goodbye(arg.parse()?)),
            Some(CMD_VALIDATE) => Ok(Request::Validate(arg.parse()?)),
            _ => Err(LeaseError::MalformedRequest {
                detail: format!("unknown command '{}'", command),
            }),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Hello(holder) => write!(f, "HELLO {}", holder),
            Request::Goodbye(ticket) => write!(f, "GBYE {}", ticket),
            Request::Validate(ticket) => write!(f, "VALD {}", ticket),
        }
    }
}

/// A response datagram. Rendered fresh for every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ticket(Ticket),
    Goodbye,
    Valid,
    NoTickets,
    InvalidTicket,
    InvalidRequest,
    AlreadyHolding,
    Corrupt,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Ticket(_) | Reply::Goodbye | Reply::Valid)
    }

    fn for_error(err: &LeaseError) -> Self {
        match err {
            LeaseError::PoolExhausted { .. } => Reply::NoTickets,
            LeaseError::InvalidTicket { .. } => Reply::InvalidTicket,
            LeaseError::MalformedRequest { .. } => Reply::InvalidRequest,
            LeaseError::HolderAlreadyLeased { .. } => Reply::AlreadyHolding,
            LeaseError::CorruptState { .. } => Reply::Corrupt,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ticket(ticket) => write!(f, "TICK {}", ticket),
            Reply::Goodbye => f.write_str("THNX See ya!"),
            Reply::Valid => f.write_str("GOOD Valid ticket"),
            Reply::NoTickets => f.write_str("FAIL no tickets available"),
            Reply::InvalidTicket => f.write_str("FAIL invalid ticket"),
            Reply::InvalidRequest => f.write_str("FAIL invalid request"),
            Reply::AlreadyHolding => f.write_str("FAIL holder already has a ticket"),
            Reply::Corrupt => f.write_str("FAIL database corrupt"),
        }
    }
}

impl FromStr for Reply {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches(['\0', '\r', '\n']);
        if let Some(ticket) = s.strip_prefix("TICK ") {
            return Ok(Reply::Ticket(ticket.parse()?));
        }
        let reply = match s {
            "THNX See ya!" => Reply::Goodbye,
            "GOOD Valid ticket" => Reply::Valid,
            "FAIL no tickets available" => Reply::NoTickets,
            "FAIL invalid ticket" => Reply::InvalidTicket,
            "FAIL invalid request" => Reply::InvalidRequest,
            "FAIL holder already has a ticket" => Reply::AlreadyHolding,
            "FAIL database corrupt" => Reply::Corrupt,
            other => {
                return Err(LeaseError::MalformedRequest {
                    detail: format!("unrecognized reply '{}'", other),
                });
            }
        };
        Ok(reply)
    }
}

pub struct ProtocolHandler;

impl ProtocolHandler {
    /// Handle one datagram against the table and report the outcome.
    ///
    /// Never panics on client input; every failure becomes a `FAIL` reply.
    pub fn handle(
        table: &mut LeaseTable,
        sink: &dyn EventSink,
        payload: &[u8],
        source: Option<SocketAddr>,
    ) -> Reply {
        let request = match Request::parse(payload) {
            Ok(request) => request,
            Err(err) => {
                let kind = match err {
                    LeaseError::InvalidTicket { .. } => EventKind::InvalidTicket,
                    _ => EventKind::InvalidRequest,
                };
                sink.record(LeaseEvent::new(kind, err.to_string(), source));
                // HELLO has a single failure reply, whatever went wrong.
                if payload.starts_with(CMD_HELLO.as_bytes()) {
                    return Reply::NoTickets;
                }
                return Reply::for_error(&err);
            }
        };

        match request {
            Request::Hello(holder) => match table.acquire(holder) {
                Ok(ticket) => {
                    sink.record(LeaseEvent::new(EventKind::Granted, ticket.to_string(), source));
                    Reply::Ticket(ticket)
                }
                Err(err) => {
                    let kind = match err {
                        LeaseError::PoolExhausted { .. } => EventKind::Exhausted,
                        LeaseError::HolderAlreadyLeased { .. } => EventKind::DuplicateHolder,
                        _ => EventKind::CorruptState,
                    };
                    sink.record(LeaseEvent::new(kind, err.to_string(), source));
                    Reply::for_error(&err)
                }
            },
            Request::Goodbye(ticket) => match table.release(&ticket) {
                Ok(()) => {
                    sink.record(LeaseEvent::new(EventKind::Released, ticket.to_string(), source));
                    Reply::Goodbye
                }
                Err(err) => {
                    sink.record(LeaseEvent::new(EventKind::InvalidTicket, err.to_string(), source));
                    Reply::for_error(&err)
                }
            },
            Request::Validate(ticket) => {
                if table.validate(&ticket) {
                    sink.record(LeaseEvent::new(EventKind::Validated, ticket.to_string(), source));
                    Reply::Valid
                } else {
                    sink.record(LeaseEvent::new(
                        EventKind::InvalidTicket,
                        format!("bogus ticket {}", ticket),
                        source,
                    ));
                    Reply::InvalidTicket
                }
            }
        }
    }
}
