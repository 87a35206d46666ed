//! Lockstep sequencer: a frame is finalized only once every connected client
//! has submitted its batch for it.

use crate::connections::ConnectionTable;
use crate::sequencer::{stamp_origin, Authority, Outgoing, Sequencer, ServerConfig};
use log::{error, info, warn};
use shared::{ConnectionId, Event, Frame, Simulation, SyncError};

pub struct LockstepServer<S: Simulation> {
    authority: Authority<S>,
    connections: ConnectionTable<S::Input>,
    config: ServerConfig,
}

impl<S: Simulation> LockstepServer<S> {
    pub fn new(simulation: S, config: ServerConfig) -> Self {
        Self {
            authority: Authority::new(simulation),
            connections: ConnectionTable::new(config.max_clients),
            config,
        }
    }

    pub fn state(&self) -> &S::State {
        self.authority.state()
    }

    pub fn connections(&self) -> &ConnectionTable<S::Input> {
        &self.connections
    }

    /// Finalizes every frame for which all batches have arrived
    pub fn try_tick(&mut self) -> Vec<Outgoing<S::Input>> {
        let mut outgoing = Vec::new();
        let mut available = self.connections.available_frames();

        while available > 0 {
            // Recipients are taken before popping so a departure drained in
            // this frame is already excluded.
            let recipients = self.connections.active_ids();
            let events = self.connections.pop_frame_events();
            outgoing.push(self.authority.finalize(events, recipients));
            available -= 1;
        }

        outgoing
    }

    fn check_declared_frame(
        &mut self,
        connection: ConnectionId,
        frame: Frame,
    ) -> Option<Outgoing<S::Input>> {
        let expected = self
            .connections
            .expected_frame(connection, self.authority.frame())?;
        let matched = frame == expected;
        if !matched {
            warn!(
                "Connection {} out of sync: declared frame {} != expected {}",
                connection, frame, expected
            );
        }

        let streak = self.connections.record_frame_check(connection, matched);
        match self.config.resync_threshold {
            Some(threshold) if streak > threshold => {
                error!(
                    "Connection {} drifted for {} submissions, resynchronizing",
                    connection, streak
                );
                self.connections.clear_pending(connection);
                match self.authority.initialize_packet(connection) {
                    Ok(packet) => Some(packet),
                    Err(e) => {
                        error!("Failed to encode resync snapshot: {}", e);
                        None
                    }
                }
            }
            _ => None,
        }
    }
}

impl<S: Simulation> Sequencer for LockstepServer<S> {
    type Input = S::Input;

    fn connect(&mut self) -> Result<(ConnectionId, Vec<Outgoing<S::Input>>), SyncError> {
        let id = self.connections.register().ok_or(SyncError::ServerFull)?;
        match self.authority.initialize_packet(id) {
            Ok(packet) => {
                info!("Connection {} joined at frame {}", id, self.authority.frame());
                Ok((id, vec![packet]))
            }
            Err(e) => {
                self.connections.remove(id);
                Err(e)
            }
        }
    }

    fn receive_frame(
        &mut self,
        connection: ConnectionId,
        frame: Frame,
        events: Vec<Event<S::Input>>,
    ) -> Result<Vec<Outgoing<S::Input>>, SyncError> {
        if !self.connections.is_active(connection) {
            return Err(SyncError::UnknownConnection(connection));
        }

        if let Some(resync) = self.check_declared_frame(connection, frame) {
            return Ok(vec![resync]);
        }

        self.connections
            .enqueue(connection, stamp_origin(connection, events));
        Ok(self.try_tick())
    }

    fn disconnect(&mut self, connection: ConnectionId) -> Vec<Outgoing<S::Input>> {
        if !self.connections.depart(connection) {
            warn!("Disconnect for unknown connection {}", connection);
            return Vec::new();
        }
        self.try_tick()
    }

    fn snapshot(&self) -> Result<Option<Outgoing<S::Input>>, SyncError> {
        let recipients = self.connections.active_ids();
        if recipients.is_empty() {
            return Ok(None);
        }
        self.authority.snapshot_packet(recipients).map(Some)
    }

    fn frame(&self) -> Frame {
        self.authority.frame()
    }

    fn connection_count(&self) -> usize {
        self.connections.active_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::platformer::{Color, Platformer, PlatformerInput};
    use shared::Packet;

    const RED: Color = Color { r: 255, g: 0, b: 0 };

    fn server() -> LockstepServer<Platformer> {
        LockstepServer::new(Platformer, ServerConfig::default())
    }

    fn join(id: ConnectionId) -> Vec<Event<PlatformerInput>> {
        vec![Event::input(
            id,
            PlatformerInput::Join {
                x: 100.0,
                y: 100.0,
                color: RED,
            },
        )]
    }

    fn idle(id: ConnectionId) -> Vec<Event<PlatformerInput>> {
        vec![Event::input(id, PlatformerInput::Move { dir: 0, jump: false })]
    }

    fn frames_of(outgoing: &[Outgoing<PlatformerInput>]) -> Vec<Frame> {
        outgoing
            .iter()
            .filter_map(|o| match o.packet {
                Packet::ServerFrame { frame, .. } => Some(frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_sends_initialize_at_current_frame() {
        let mut server = server();
        let (id, out) = server.connect().unwrap();
        assert_eq!(id, ConnectionId(1));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipients, vec![id]);
        match &out[0].packet {
            Packet::ClientInitialize { frame, state, .. } => {
                assert_eq!(*frame, 0);
                let world = Platformer.deserialize(state).unwrap();
                assert!(world.players.is_empty());
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_two_client_tick_in_registration_order() {
        let mut server = server();
        let (a, _) = server.connect().unwrap();
        let (b, _) = server.connect().unwrap();

        // B submits first; ordering must still follow registration
        assert!(server.receive_frame(b, 1, join(b)).unwrap().is_empty());
        let out = server.receive_frame(a, 1, join(a)).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipients, vec![a, b]);
        match &out[0].packet {
            Packet::ServerFrame { frame, events } => {
                assert_eq!(*frame, 1);
                assert_eq!(events.len(), 2);
                assert_eq!(events[0].origin, a);
                assert_eq!(events[1].origin, b);
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
        assert_eq!(server.state().players.len(), 2);
    }

    #[test]
    fn test_drain_completes_all_available_frames() {
        let mut server = server();
        let (a, _) = server.connect().unwrap();
        let (b, _) = server.connect().unwrap();

        for frame in 1..=4 {
            assert!(server.receive_frame(a, frame, idle(a)).unwrap().is_empty());
        }
        let mut finalized = Vec::new();
        for frame in 1..=4 {
            finalized.extend(frames_of(&server.receive_frame(b, frame, idle(b)).unwrap()));
        }
        assert_eq!(finalized, vec![1, 2, 3, 4]);
        assert_eq!(server.frame(), 4);
    }

    #[test]
    fn test_backlog_drains_in_one_pass() {
        let mut server = server();
        let (a, _) = server.connect().unwrap();
        let (b, _) = server.connect().unwrap();
        let (c, _) = server.connect().unwrap();

        for frame in 1..=3 {
            assert!(server.receive_frame(a, frame, idle(a)).unwrap().is_empty());
            assert!(server.receive_frame(b, frame, idle(b)).unwrap().is_empty());
        }
        assert_eq!(server.frame(), 0);

        // Removing the only blocker releases the whole backlog at once
        let out = server.disconnect(c);
        assert_eq!(frames_of(&out), vec![1, 2, 3]);
        assert!(out.iter().all(|o| o.recipients == vec![a, b]));
        match &out[0].packet {
            Packet::ServerFrame { events, .. } => {
                assert_eq!(events.len(), 3);
                assert_eq!(events[2], Event::disconnect(c));
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
        assert_eq!(server.frame(), 3);
        assert_eq!(server.connections().pending_len(a), Some(0));
    }

    #[test]
    fn test_silent_client_blocks_progress() {
        let mut server = server();
        let (a, _) = server.connect().unwrap();
        let (b, _) = server.connect().unwrap();

        for frame in 1..=3 {
            server.receive_frame(a, frame, idle(a)).unwrap();
        }
        server.receive_frame(b, 1, idle(b)).unwrap();
        server.receive_frame(b, 2, idle(b)).unwrap();
        assert_eq!(server.frame(), 2);

        // One client silent: nothing more is finalized
        let (_c, _) = server.connect().unwrap();
        assert!(server.receive_frame(b, 3, idle(b)).unwrap().is_empty());
        assert_eq!(server.frame(), 2);
    }

    #[test]
    fn test_disconnect_mid_round() {
        let mut server = server();
        let (a, _) = server.connect().unwrap();
        let (b, _) = server.connect().unwrap();
        let (c, _) = server.connect().unwrap();

        server.receive_frame(a, 1, join(a)).unwrap();
        server.receive_frame(b, 1, join(b)).unwrap();
        let out = server.disconnect(c);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipients, vec![a, b]);
        match &out[0].packet {
            Packet::ServerFrame { frame, events } => {
                assert_eq!(*frame, 1);
                assert_eq!(events.len(), 3);
                assert!(events[2].is_disconnect());
                assert_eq!(events[2].origin, c);
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
        assert_eq!(server.connection_count(), 2);
        assert!(!server.connections().contains(c));
    }

    #[test]
    fn test_last_disconnect_still_reaches_state() {
        let mut server = server();
        let (a, _) = server.connect().unwrap();
        server.receive_frame(a, 1, join(a)).unwrap();
        assert_eq!(server.state().players.len(), 1);

        let out = server.disconnect(a);
        assert_eq!(out.len(), 1);
        assert!(out[0].recipients.is_empty());
        assert!(server.state().players.is_empty());
        assert!(server.connections().is_empty());
    }

    #[test]
    fn test_late_joiner_starts_at_current_frame() {
        let mut server = server();
        let (a, _) = server.connect().unwrap();
        server.receive_frame(a, 1, join(a)).unwrap();
        server.receive_frame(a, 2, idle(a)).unwrap();

        let (_, out) = server.connect().unwrap();
        match &out[0].packet {
            Packet::ClientInitialize { frame, state, .. } => {
                assert_eq!(*frame, 2);
                let world = Platformer.deserialize(state).unwrap();
                assert_eq!(&world, server.state());
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn test_frame_mismatch_is_tolerated() {
        let mut server = server();
        let (a, _) = server.connect().unwrap();
        let out = server.receive_frame(a, 42, idle(a)).unwrap();
        assert_eq!(frames_of(&out), vec![1]);
    }

    #[test]
    fn test_resync_after_threshold() {
        let mut server = LockstepServer::new(
            Platformer,
            ServerConfig {
                max_clients: 4,
                resync_threshold: Some(1),
            },
        );
        let (a, _) = server.connect().unwrap();
        let (b, _) = server.connect().unwrap();

        assert!(server.receive_frame(a, 9, idle(a)).unwrap().is_empty());
        let out = server.receive_frame(a, 9, idle(a)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipients, vec![a]);
        assert!(matches!(out[0].packet, Packet::ClientInitialize { frame: 0, .. }));
        assert_eq!(server.connections().pending_len(a), Some(0));

        // After resync the connection is expected at the next frame again
        server.receive_frame(a, 1, idle(a)).unwrap();
        let out = server.receive_frame(b, 1, idle(b)).unwrap();
        assert_eq!(frames_of(&out), vec![1]);
    }

    #[test]
    fn test_server_full() {
        let mut server = LockstepServer::new(
            Platformer,
            ServerConfig {
                max_clients: 1,
                resync_threshold: None,
            },
        );
        server.connect().unwrap();
        assert!(matches!(server.connect(), Err(SyncError::ServerFull)));
    }

    #[test]
    fn test_unknown_connection_rejected() {
        let mut server = server();
        let result = server.receive_frame(ConnectionId(7), 1, Vec::new());
        assert!(matches!(result, Err(SyncError::UnknownConnection(_))));
        assert!(server.disconnect(ConnectionId(7)).is_empty());
    }

    #[test]
    fn test_snapshot_targets_active_connections() {
        let mut server = server();
        assert!(server.snapshot().unwrap().is_none());

        let (a, _) = server.connect().unwrap();
        let snapshot = server.snapshot().unwrap().unwrap();
        assert_eq!(snapshot.recipients, vec![a]);
        assert!(matches!(snapshot.packet, Packet::StateSnapshot { frame: 0, .. }));
    }
}
