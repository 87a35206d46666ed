//! Pieces shared by the lockstep and rollback sequencers.

use log::debug;
use shared::{ConnectionId, Event, Frame, Packet, Simulation, SyncError};

/// Tunables for a sequencer instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of registered connections
    pub max_clients: usize,
    /// Consecutive frame mismatches tolerated before a connection is
    /// re-initialized. `None` only logs mismatches.
    pub resync_threshold: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 32,
            resync_threshold: None,
        }
    }
}

/// A packet the transport must deliver, with its recipients
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing<I> {
    pub recipients: Vec<ConnectionId>,
    pub packet: Packet<I>,
}

impl<I> Outgoing<I> {
    pub fn to(connection: ConnectionId, packet: Packet<I>) -> Self {
        Self {
            recipients: vec![connection],
            packet,
        }
    }
}

/// Canonical state and frame clock
///
/// The only place `update` runs on the server. Both sequencers own one and
/// call it from their drain loop.
pub struct Authority<S: Simulation> {
    simulation: S,
    state: S::State,
    frame: Frame,
}

impl<S: Simulation> Authority<S> {
    pub fn new(simulation: S) -> Self {
        let state = simulation.initial_state();
        Self {
            simulation,
            state,
            frame: 0,
        }
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    pub fn state(&self) -> &S::State {
        &self.state
    }

    /// Bootstrap packet for a connection joining at the current frame
    pub fn initialize_packet(
        &self,
        connection: ConnectionId,
    ) -> Result<Outgoing<S::Input>, SyncError> {
        let state = self.simulation.serialize(&self.state)?;
        Ok(Outgoing::to(
            connection,
            Packet::ClientInitialize {
                connection,
                frame: self.frame,
                state,
            },
        ))
    }

    /// Applies one frame of events and builds its broadcast
    pub fn finalize(
        &mut self,
        events: Vec<Event<S::Input>>,
        recipients: Vec<ConnectionId>,
    ) -> Outgoing<S::Input> {
        self.simulation.update(&mut self.state, &events);
        self.frame += 1;
        debug!(
            "Finalized frame {} with {} events for {} connections",
            self.frame,
            events.len(),
            recipients.len()
        );

        Outgoing {
            recipients,
            packet: Packet::ServerFrame {
                frame: self.frame,
                events,
            },
        }
    }

    /// Full-state packet for the periodic snapshot broadcast
    pub fn snapshot_packet(
        &self,
        recipients: Vec<ConnectionId>,
    ) -> Result<Outgoing<S::Input>, SyncError> {
        let state = self.simulation.serialize(&self.state)?;
        Ok(Outgoing {
            recipients,
            packet: Packet::StateSnapshot {
                frame: self.frame,
                state,
            },
        })
    }
}

/// Restamps every event with the connection that submitted it
pub fn stamp_origin<I>(origin: ConnectionId, events: Vec<Event<I>>) -> Vec<Event<I>> {
    events
        .into_iter()
        .map(|mut event| {
            if event.origin != origin {
                debug!(
                    "Connection {} submitted event claiming origin {}",
                    origin, event.origin
                );
                event.origin = origin;
            }
            event
        })
        .collect()
}

/// Common surface of both sequencer variants, driven by the network host
pub trait Sequencer {
    type Input;

    /// Registers a connection and returns its bootstrap packet
    fn connect(&mut self) -> Result<(ConnectionId, Vec<Outgoing<Self::Input>>), SyncError>;

    /// Accepts one client frame and drains every frame that became complete
    fn receive_frame(
        &mut self,
        connection: ConnectionId,
        frame: Frame,
        events: Vec<Event<Self::Input>>,
    ) -> Result<Vec<Outgoing<Self::Input>>, SyncError>;

    /// Handles a dropped connection
    fn disconnect(&mut self, connection: ConnectionId) -> Vec<Outgoing<Self::Input>>;

    /// Best-effort full-state broadcast
    fn snapshot(&self) -> Result<Option<Outgoing<Self::Input>>, SyncError>;

    fn frame(&self) -> Frame;

    fn connection_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::platformer::{Platformer, PlatformerInput};

    #[test]
    fn test_authority_starts_at_frame_zero() {
        let authority = Authority::new(Platformer);
        assert_eq!(authority.frame(), 0);
        assert!(authority.state().players.is_empty());
    }

    #[test]
    fn test_finalize_advances_and_broadcasts() {
        let mut authority = Authority::new(Platformer);
        let events = vec![Event::input(
            ConnectionId(1),
            PlatformerInput::Move { dir: 1, jump: false },
        )];

        let out = authority.finalize(events.clone(), vec![ConnectionId(1), ConnectionId(2)]);
        assert_eq!(authority.frame(), 1);
        assert_eq!(out.recipients, vec![ConnectionId(1), ConnectionId(2)]);
        assert_eq!(out.packet, Packet::ServerFrame { frame: 1, events });
    }

    #[test]
    fn test_initialize_packet_carries_current_frame() {
        let mut authority = Authority::new(Platformer);
        authority.finalize(Vec::new(), Vec::new());
        authority.finalize(Vec::new(), Vec::new());

        let out = authority.initialize_packet(ConnectionId(3)).unwrap();
        match out.packet {
            Packet::ClientInitialize {
                connection, frame, ..
            } => {
                assert_eq!(connection, ConnectionId(3));
                assert_eq!(frame, 2);
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_stamp_origin_overrides_claims() {
        let events = vec![Event::input(ConnectionId(9), 1u8), Event::input(ConnectionId(2), 2u8)];
        let stamped = stamp_origin(ConnectionId(2), events);
        assert!(stamped.iter().all(|e| e.origin == ConnectionId(2)));
    }
}
