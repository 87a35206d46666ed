//! Types shared by the frame sequencer and its clients.
//!
//! Everything that must agree bit-for-bit on both ends of a connection lives
//! here: the frame counter, the event model, the simulation contract, the
//! snapshot codec and the wire protocol. The `platformer` module is the demo
//! simulation driven by the server and client binaries.

pub mod clock;
pub mod error;
pub mod event;
pub mod frame;
pub mod platformer;
pub mod protocol;
pub mod simulation;
pub mod snapshot;

pub use clock::FrameClock;
pub use error::SyncError;
pub use event::{ConnectionId, Event, EventKind};
pub use frame::{Frame, FrameRecord};
pub use protocol::{read_packet, write_packet, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
pub use simulation::Simulation;
pub use snapshot::{decode_state, encode_state, Snapshot};
