//! Per-connection submission queues for the frame sequencer
//!
//! This module tracks every registered connection together with the event
//! batches it has submitted but the sequencer has not consumed yet:
//! - Connection registration with capacity limits and id assignment
//! - FIFO batch queues, one batch per submitted frame
//! - Departure handling for lockstep, where a dropped connection still owes
//!   its in-flight frame a disconnect event
//! - Declared-frame bookkeeping used to detect drifting clients
//!
//! Connections are stored in a `BTreeMap` keyed by `ConnectionId`. Ids grow
//! with registration, so map order is registration order and frame events are
//! always concatenated in the same order on every pass.

use log::info;
use shared::{ConnectionId, Event, Frame};
use std::collections::{BTreeMap, VecDeque};

/// A registered connection and its not-yet-consumed batches
#[derive(Debug)]
pub struct Connection<I> {
    /// Registration-ordered identifier assigned by the server
    pub id: ConnectionId,
    /// Submitted batches waiting for the sequencer, oldest first
    pub pending: VecDeque<Vec<Event<I>>>,
    /// Set once the transport dropped; the connection only drains now
    pub departing: bool,
    /// Consecutive submissions whose declared frame did not match
    pub desync_streak: u32,
}

impl<I> Connection<I> {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            pending: VecDeque::new(),
            departing: false,
            desync_streak: 0,
        }
    }
}

/// Registered connections and their pending batches
///
/// Owned exclusively by one sequencer. The drain routine is the only reader
/// that pops batches; message handlers only push.
pub struct ConnectionTable<I> {
    connections: BTreeMap<ConnectionId, Connection<I>>,
    next_id: u32,
    max_clients: usize,
}

impl<I> ConnectionTable<I> {
    /// Creates an empty table. Ids start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection with an empty queue
    ///
    /// Returns `None` when the table is at capacity. Departing connections
    /// still count until their last batch is drained.
    pub fn register(&mut self) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_clients {
            return None;
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        info!("Connection {} registered", id);
        self.connections.insert(id, Connection::new(id));
        Some(id)
    }

    /// Drops a connection and anything it had queued
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        if self.connections.remove(&id).is_some() {
            info!("Connection {} removed", id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn is_active(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .map(|c| !c.departing)
            .unwrap_or(false)
    }

    /// Frame number the next submission from `id` should declare
    pub fn expected_frame(&self, id: ConnectionId, server_frame: Frame) -> Option<Frame> {
        self.connections
            .get(&id)
            .map(|c| server_frame + 1 + c.pending.len() as Frame)
    }

    /// Updates the mismatch streak for `id` and returns its new value
    pub fn record_frame_check(&mut self, id: ConnectionId, matched: bool) -> u32 {
        match self.connections.get_mut(&id) {
            Some(connection) => {
                if matched {
                    connection.desync_streak = 0;
                } else {
                    connection.desync_streak += 1;
                }
                connection.desync_streak
            }
            None => 0,
        }
    }

    /// Appends a submitted batch to the connection's queue
    pub fn enqueue(&mut self, id: ConnectionId, batch: Vec<Event<I>>) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) if !connection.departing => {
                connection.pending.push_back(batch);
                true
            }
            _ => false,
        }
    }

    /// Discards everything `id` has queued and resets its streak
    pub fn clear_pending(&mut self, id: ConnectionId) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.pending.clear();
            connection.desync_streak = 0;
        }
    }

    /// Marks `id` as gone and queues the batch carrying its disconnect event
    ///
    /// The connection leaves the broadcast set immediately but keeps its
    /// queue, so the frame it was about to complete still receives the
    /// disconnect. It is removed once that queue is drained.
    pub fn depart(&mut self, id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) if !connection.departing => {
                connection.departing = true;
                connection.pending.push_back(vec![Event::disconnect(id)]);
                info!("Connection {} departing", id);
                true
            }
            _ => false,
        }
    }

    /// Number of frames for which every required batch has arrived
    ///
    /// Active connections gate the count; departing ones never block. With
    /// no active connection left, departing queues drain on their own.
    pub fn available_frames(&self) -> usize {
        let active_min = self
            .connections
            .values()
            .filter(|c| !c.departing)
            .map(|c| c.pending.len())
            .min();

        match active_min {
            Some(min) => min,
            None => self
                .connections
                .values()
                .map(|c| c.pending.len())
                .max()
                .unwrap_or(0),
        }
    }

    /// Pops one batch per connection and concatenates them in id order
    ///
    /// Callers must check `available_frames` first. Departing connections
    /// whose queue runs dry are dropped here.
    pub fn pop_frame_events(&mut self) -> Vec<Event<I>> {
        let mut events = Vec::new();
        for connection in self.connections.values_mut() {
            if let Some(batch) = connection.pending.pop_front() {
                events.extend(batch);
            }
        }

        let drained: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.departing && c.pending.is_empty())
            .map(|c| c.id)
            .collect();
        for id in drained {
            self.remove(id);
        }

        events
    }

    /// Ids that receive broadcasts, in registration order
    pub fn active_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| !c.departing)
            .map(|c| c.id)
            .collect()
    }

    pub fn pending_len(&self, id: ConnectionId) -> Option<usize> {
        self.connections.get(&id).map(|c| c.pending.len())
    }

    /// Number of registered connections, departing ones included
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.connections.values().filter(|c| !c.departing).count()
    }
}
