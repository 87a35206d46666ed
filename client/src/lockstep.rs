//! Lockstep client: simulates only frames the server has finalized and keeps
//! at most one batch in flight.

use crate::reconciler::{Reconciler, SnapshotCheck};
use log::{info, warn};
use shared::{ConnectionId, Event, Frame, Packet, Simulation, SyncError};

pub struct LockstepClient<S: Simulation> {
    simulation: S,
    connection: Option<ConnectionId>,
    state: S::State,
    /// Last finalized frame, or the submitted frame while a batch is in flight
    frame: Frame,
    can_tick: bool,
}

impl<S: Simulation> LockstepClient<S> {
    pub fn new(simulation: S) -> Self {
        let state = simulation.initial_state();
        Self {
            simulation,
            connection: None,
            state,
            frame: 0,
            can_tick: false,
        }
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }
}

impl<S: Simulation> Reconciler for LockstepClient<S> {
    type State = S::State;
    type Input = S::Input;

    fn client_initialize(
        &mut self,
        connection: ConnectionId,
        frame: Frame,
        state: &[u8],
    ) -> Result<(), SyncError> {
        let state = match self.simulation.deserialize(state) {
            Ok(state) => state,
            Err(e) => {
                self.disconnect();
                return Err(e);
            }
        };

        info!("Initialized as {} at frame {}", connection, frame);
        self.state = state;
        self.frame = frame;
        self.connection = Some(connection);
        self.can_tick = true;
        Ok(())
    }

    fn server_frame(&mut self, frame: Frame, events: Vec<Event<S::Input>>) {
        if self.connection.is_none() {
            warn!("Ignoring frame {} received before initialization", frame);
            return;
        }
        if frame != self.frame {
            warn!(
                "Client received out of sync frame: {} != {}",
                frame, self.frame
            );
        }

        self.simulation.update(&mut self.state, &events);
        self.frame = frame;
        self.can_tick = true;
    }

    fn tick_frame(&mut self, events: Vec<Event<S::Input>>) -> Result<Packet<S::Input>, SyncError> {
        if self.connection.is_none() {
            return Err(SyncError::NotConnected);
        }
        if !self.can_tick {
            return Err(SyncError::TickPending { frame: self.frame });
        }

        self.frame += 1;
        self.can_tick = false;
        Ok(Packet::ClientFrame {
            frame: self.frame,
            events,
        })
    }

    fn verify_snapshot(&self, frame: Frame, state: &[u8]) -> Result<SnapshotCheck, SyncError> {
        if frame != self.confirmed_frame() {
            return Ok(SnapshotCheck::Stale);
        }
        let server_state = self.simulation.deserialize(state)?;
        if server_state == self.state {
            Ok(SnapshotCheck::Matched)
        } else {
            Ok(SnapshotCheck::Diverged)
        }
    }

    fn can_tick(&self) -> bool {
        self.connection.is_some() && self.can_tick
    }

    fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    fn state(&self) -> &S::State {
        &self.state
    }

    fn confirmed_frame(&self) -> Frame {
        if self.can_tick {
            self.frame
        } else {
            self.frame.saturating_sub(1)
        }
    }

    fn disconnect(&mut self) {
        self.connection = None;
        self.can_tick = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::platformer::{Color, Platformer, PlatformerInput, World};

    const ME: ConnectionId = ConnectionId(1);

    fn join() -> Vec<Event<PlatformerInput>> {
        vec![Event::input(
            ME,
            PlatformerInput::Join {
                x: 10.0,
                y: 10.0,
                color: Color { r: 0, g: 255, b: 0 },
            },
        )]
    }

    fn initialized(frame: Frame) -> LockstepClient<Platformer> {
        let mut client = LockstepClient::new(Platformer);
        let bytes = Platformer.serialize(&World::default()).unwrap();
        client.client_initialize(ME, frame, &bytes).unwrap();
        client
    }

    #[test]
    fn test_tick_before_initialize_fails() {
        let mut client = LockstepClient::new(Platformer);
        assert!(!client.can_tick());
        assert!(matches!(
            client.tick_frame(Vec::new()),
            Err(SyncError::NotConnected)
        ));
    }

    #[test]
    fn test_initialize_adopts_frame_and_state() {
        let client = initialized(7);
        assert_eq!(client.frame(), 7);
        assert_eq!(client.confirmed_frame(), 7);
        assert!(client.can_tick());
        assert_eq!(client.connection(), Some(ME));
    }

    #[test]
    fn test_one_outstanding_batch() {
        let mut client = initialized(0);
        let packet = client.tick_frame(join()).unwrap();
        assert_eq!(
            packet,
            Packet::ClientFrame {
                frame: 1,
                events: join()
            }
        );
        assert!(!client.can_tick());
        assert!(matches!(
            client.tick_frame(Vec::new()),
            Err(SyncError::TickPending { frame: 1 })
        ));

        client.server_frame(1, join());
        assert!(client.can_tick());
        assert_eq!(client.state().players.len(), 1);
    }

    #[test]
    fn test_out_of_sync_frame_still_applied() {
        let mut client = initialized(0);
        client.tick_frame(join()).unwrap();
        client.server_frame(5, join());
        assert_eq!(client.frame(), 5);
        assert_eq!(client.state().players.len(), 1);
    }

    #[test]
    fn test_malformed_snapshot_leaves_client_disconnected() {
        let mut client = LockstepClient::new(Platformer);
        let result = client.client_initialize(ME, 0, &[0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(SyncError::Snapshot(_))));
        assert!(!client.is_connected());
        assert!(!client.can_tick());
    }

    #[test]
    fn test_verify_snapshot() {
        let mut client = initialized(0);
        client.tick_frame(join()).unwrap();

        // Frame 1 not confirmed yet
        let mut world = World::default();
        Platformer.update(&mut world, &join());
        let bytes = Platformer.serialize(&world).unwrap();
        assert_eq!(client.verify_snapshot(1, &bytes).unwrap(), SnapshotCheck::Stale);

        client.server_frame(1, join());
        assert_eq!(
            client.verify_snapshot(1, &bytes).unwrap(),
            SnapshotCheck::Matched
        );

        let empty = Platformer.serialize(&World::default()).unwrap();
        assert_eq!(
            client.verify_snapshot(1, &empty).unwrap(),
            SnapshotCheck::Diverged
        );
    }

    #[test]
    fn test_disconnected_packet_stops_ticking() {
        let mut client = initialized(0);
        client
            .handle_packet(Packet::Disconnected {
                reason: "bye".to_string(),
            })
            .unwrap();
        assert!(!client.is_connected());
        assert!(matches!(
            client.tick_frame(Vec::new()),
            Err(SyncError::NotConnected)
        ));
    }
}
