use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the server assigns to a connection when it registers.
///
/// Ids are handed out in strictly increasing order, so `Ord` on the id is the
/// registration order. Every place that concatenates per-connection batches
/// iterates in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What happened. `Input` payloads are defined by the simulation and never
/// inspected by the synchronization core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind<I> {
    Input(I),
    /// Synthesized by the server when a connection drops.
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<I> {
    pub origin: ConnectionId,
    pub kind: EventKind<I>,
}

impl<I> Event<I> {
    pub fn input(origin: ConnectionId, input: I) -> Self {
        Self {
            origin,
            kind: EventKind::Input(input),
        }
    }

    pub fn disconnect(origin: ConnectionId) -> Self {
        Self {
            origin,
            kind: EventKind::Disconnect,
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self.kind, EventKind::Disconnect)
    }
}
