//! Common surface of the lockstep and rollback clients

use log::{debug, warn};
use shared::{ConnectionId, Event, Frame, Packet, SyncError};

/// Outcome of comparing a server snapshot with the local confirmed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotCheck {
    /// Local confirmed state equals the server's
    Matched,
    /// Same frame, different state
    Diverged,
    /// Snapshot frame differs from the local confirmed frame
    Stale,
}

/// Per-connection state machine that turns server packets into local state
pub trait Reconciler {
    type State;
    type Input;

    /// Replaces local state with the server's bootstrap snapshot
    fn client_initialize(
        &mut self,
        connection: ConnectionId,
        frame: Frame,
        state: &[u8],
    ) -> Result<(), SyncError>;

    /// Applies one authoritative frame
    fn server_frame(&mut self, frame: Frame, events: Vec<Event<Self::Input>>);

    /// Finishes a local frame and returns the packet to send
    fn tick_frame(
        &mut self,
        events: Vec<Event<Self::Input>>,
    ) -> Result<Packet<Self::Input>, SyncError>;

    fn verify_snapshot(&self, frame: Frame, state: &[u8]) -> Result<SnapshotCheck, SyncError>;

    /// Whether the driver may call `tick_frame` now
    fn can_tick(&self) -> bool;

    fn connection(&self) -> Option<ConnectionId>;

    fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    /// State to present locally, predicted or confirmed
    fn state(&self) -> &Self::State;

    /// Last frame confirmed by the server
    fn confirmed_frame(&self) -> Frame;

    fn disconnect(&mut self);

    /// Routes a server packet to the matching handler
    ///
    /// Only a malformed bootstrap snapshot is returned as an error. Snapshot
    /// divergence is logged and simulation continues.
    fn handle_packet(&mut self, packet: Packet<Self::Input>) -> Result<(), SyncError> {
        match packet {
            Packet::ClientInitialize {
                connection,
                frame,
                state,
            } => self.client_initialize(connection, frame, &state),

            Packet::ServerFrame { frame, events } => {
                self.server_frame(frame, events);
                Ok(())
            }

            Packet::StateSnapshot { frame, state } => {
                match self.verify_snapshot(frame, &state) {
                    Ok(SnapshotCheck::Matched) => debug!("Snapshot at frame {} matched", frame),
                    Ok(SnapshotCheck::Stale) => debug!(
                        "Skipped snapshot for frame {}, confirmed frame is {}",
                        frame,
                        self.confirmed_frame()
                    ),
                    Ok(SnapshotCheck::Diverged) => {
                        warn!("Local state diverged from server at frame {}", frame)
                    }
                    Err(e) => warn!("Unreadable snapshot for frame {}: {}", frame, e),
                }
                Ok(())
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.disconnect();
                Ok(())
            }

            other => {
                warn!("Unexpected {} packet from server", other.kind());
                Ok(())
            }
        }
    }
}
