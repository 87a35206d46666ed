use crate::event::ConnectionId;
use crate::frame::Frame;
use thiserror::Error;

/// Errors surfaced by the synchronization layer.
///
/// Frame-number mismatches and queue bookkeeping drift are deliberately not
/// represented here: they are logged and simulation continues.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("malformed state snapshot: {0}")]
    Snapshot(#[source] bincode::Error),

    #[error("packet codec failure: {0}")]
    Codec(#[source] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet of {size} bytes exceeds limit of {limit} bytes")]
    PacketTooLarge { size: usize, limit: usize },

    #[error("frame {frame} already submitted, waiting for the server")]
    TickPending { frame: Frame },

    #[error("not connected to a server")]
    NotConnected,

    #[error("server full")]
    ServerFull,

    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}
