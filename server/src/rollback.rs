//! Rollback sequencer.
//!
//! Batches and drains frames exactly like lockstep. Server-originated events
//! (currently only synthesized disconnects) live in their own queue and are
//! appended to the next finalized frame instead of occupying a connection's
//! slot, so a dropped client's queue is discarded immediately.

use crate::connections::ConnectionTable;
use crate::sequencer::{stamp_origin, Authority, Outgoing, Sequencer, ServerConfig};
use log::{debug, error, info, warn};
use shared::{ConnectionId, Event, Frame, Simulation, SyncError};
use std::collections::VecDeque;

pub struct RollbackServer<S: Simulation> {
    authority: Authority<S>,
    connections: ConnectionTable<S::Input>,
    server_events: VecDeque<Event<S::Input>>,
    config: ServerConfig,
}

impl<S: Simulation> RollbackServer<S> {
    pub fn new(simulation: S, config: ServerConfig) -> Self {
        Self {
            authority: Authority::new(simulation),
            connections: ConnectionTable::new(config.max_clients),
            server_events: VecDeque::new(),
            config,
        }
    }

    pub fn state(&self) -> &S::State {
        self.authority.state()
    }

    pub fn connections(&self) -> &ConnectionTable<S::Input> {
        &self.connections
    }

    /// Server events waiting for the next finalized frame
    pub fn pending_server_events(&self) -> usize {
        self.server_events.len()
    }

    pub fn try_tick(&mut self) -> Vec<Outgoing<S::Input>> {
        let mut outgoing = Vec::new();
        if self.connections.is_empty() {
            return outgoing;
        }

        let mut available = self.connections.available_frames();
        while available > 0 {
            let recipients = self.connections.active_ids();
            let mut events = self.connections.pop_frame_events();
            events.extend(self.server_events.drain(..));
            outgoing.push(self.authority.finalize(events, recipients));
            available -= 1;
        }

        outgoing
    }
}

impl<S: Simulation> Sequencer for RollbackServer<S> {
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
        let expected = self
            .connections
            .expected_frame(connection, self.authority.frame())
            .ok_or(SyncError::UnknownConnection(connection))?;

        let matched = frame == expected;
        if !matched {
            warn!(
                "Connection {} out of sync: declared frame {} != expected {}",
                connection, frame, expected
            );
        }
        let streak = self.connections.record_frame_check(connection, matched);
        if let Some(threshold) = self.config.resync_threshold {
            if streak > threshold {
                error!(
                    "Connection {} drifted for {} submissions, resynchronizing",
                    connection, streak
                );
                self.connections.clear_pending(connection);
                return Ok(vec![self.authority.initialize_packet(connection)?]);
            }
        }

        self.connections
            .enqueue(connection, stamp_origin(connection, events));
        Ok(self.try_tick())
    }

    fn disconnect(&mut self, connection: ConnectionId) -> Vec<Outgoing<S::Input>> {
        if !self.connections.remove(connection) {
            warn!("Disconnect for unknown connection {}", connection);
            return Vec::new();
        }

        self.server_events.push_back(Event::disconnect(connection));
        debug!(
            "Queued disconnect for {} ({} server events pending)",
            connection,
            self.server_events.len()
        );
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
