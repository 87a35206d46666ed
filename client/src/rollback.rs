//! Rollback client
//!
//! The client simulates its own frames immediately and submits them, keeping
//! every prediction in `client_frames` until the server confirms that frame.
//! Authoritative frames are buffered in `server_frames`. Each arrival triggers
//! a reconciliation pass:
//!
//! 1. Rewind to the last state known to match the server (`sync`)
//! 2. Replay every confirmed frame with the server's events, discarding the
//!    matching predictions
//! 3. Move the sync point to the newest confirmed frame
//! 4. Re-apply the predictions that are still unconfirmed
//!
//! Counters: `sync_frame <= state_frame <= event_frame`. After a pass
//! `sync_frame == state_frame` and the unconfirmed tail is
//! `event_frame - state_frame` frames long.

use crate::reconciler::{Reconciler, SnapshotCheck};
use log::{debug, error, info, warn};
use shared::{ConnectionId, Event, Frame, FrameRecord, Packet, Simulation, Snapshot, SyncError};
use std::collections::VecDeque;

/// Default limit on unconfirmed frames before `can_tick` turns false
pub const DEFAULT_MAX_PREDICTION: Frame = 8;

pub struct RollbackClient<S: Simulation> {
    simulation: S,
    connection: Option<ConnectionId>,
    /// Current state, predictions included
    state: S::State,
    sync: Snapshot<S::State>,
    sync_frame: Frame,
    state_frame: Frame,
    event_frame: Frame,
    client_frames: VecDeque<FrameRecord<S::State, S::Input>>,
    server_frames: VecDeque<FrameRecord<S::State, S::Input>>,
    max_prediction: Frame,
}

impl<S: Simulation> RollbackClient<S> {
    pub fn new(simulation: S) -> Self {
        Self::with_max_prediction(simulation, DEFAULT_MAX_PREDICTION)
    }

    pub fn with_max_prediction(simulation: S, max_prediction: Frame) -> Self {
        let state = simulation.initial_state();
        Self {
            sync: Snapshot::capture(0, &state),
            simulation,
            connection: None,
            state,
            sync_frame: 0,
            state_frame: 0,
            event_frame: 0,
            client_frames: VecDeque::new(),
            server_frames: VecDeque::new(),
            max_prediction,
        }
    }

    pub fn sync_frame(&self) -> Frame {
        self.sync_frame
    }

    pub fn state_frame(&self) -> Frame {
        self.state_frame
    }

    pub fn event_frame(&self) -> Frame {
        self.event_frame
    }

    /// Number of submitted frames the server has not confirmed yet
    pub fn prediction_depth(&self) -> Frame {
        self.event_frame.saturating_sub(self.state_frame)
    }

    /// State at the last confirmed frame
    pub fn confirmed_state(&self) -> &S::State {
        &self.sync.state
    }

    /// Rewinds to the sync point, replays confirmed frames and re-predicts
    ///
    /// Running it again without new server frames yields the same state.
    pub fn reconcile(&mut self) {
        let server_expected = (self.state_frame - self.sync_frame) as usize;
        if self.server_frames.len() != server_expected {
            error!(
                "Server frame queue out of sync: {} != {} - {}",
                self.server_frames.len(),
                self.state_frame,
                self.sync_frame
            );
        }
        let client_expected = self.event_frame.saturating_sub(self.sync_frame) as usize;
        if self.client_frames.len() != client_expected {
            error!(
                "Client frame queue out of sync: {} != {} - {}",
                self.client_frames.len(),
                self.event_frame,
                self.sync_frame
            );
        }

        self.state = self.sync.restore();

        for _ in self.sync_frame..self.state_frame {
            self.client_frames.pop_front();
            match self.server_frames.pop_front() {
                Some(record) => self.simulation.update(&mut self.state, &record.events),
                None => break,
            }
        }

        self.sync_frame = self.state_frame;
        self.sync = Snapshot::capture(self.sync_frame, &self.state);

        if self.event_frame < self.state_frame {
            error!(
                "Server confirmed frame {} beyond submitted frame {}",
                self.state_frame, self.event_frame
            );
            self.event_frame = self.state_frame;
        }

        for record in &self.client_frames {
            self.simulation.update(&mut self.state, &record.events);
        }

        debug!(
            "Reconciled to frame {} with {} predicted frames",
            self.sync_frame,
            self.client_frames.len()
        );
    }
}

impl<S: Simulation> Reconciler for RollbackClient<S> {
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
        self.sync = Snapshot::capture(frame, &state);
        self.state = state;
        self.sync_frame = frame;
        self.state_frame = frame;
        self.event_frame = frame;
        self.client_frames.clear();
        self.server_frames.clear();
        self.connection = Some(connection);
        Ok(())
    }

    fn server_frame(&mut self, frame: Frame, events: Vec<Event<S::Input>>) {
        if self.connection.is_none() {
            warn!("Ignoring frame {} received before initialization", frame);
            return;
        }
        if frame != self.state_frame + 1 {
            warn!(
                "Client received out of sync frame: {} != {}",
                frame,
                self.state_frame + 1
            );
        }

        self.state_frame += 1;
        self.server_frames
            .push_back(FrameRecord::authoritative(self.state_frame, events));
        self.reconcile();
    }

    fn tick_frame(&mut self, events: Vec<Event<S::Input>>) -> Result<Packet<S::Input>, SyncError> {
        if self.connection.is_none() {
            return Err(SyncError::NotConnected);
        }

        self.event_frame += 1;
        self.client_frames.push_back(FrameRecord::predicted(
            self.event_frame,
            self.state.clone(),
            events.clone(),
        ));
        self.simulation.update(&mut self.state, &events);

        Ok(Packet::ClientFrame {
            frame: self.event_frame,
            events,
        })
    }

    fn verify_snapshot(&self, frame: Frame, state: &[u8]) -> Result<SnapshotCheck, SyncError> {
        if frame != self.sync_frame {
            return Ok(SnapshotCheck::Stale);
        }
        let server_state = self.simulation.deserialize(state)?;
        if server_state == self.sync.state {
            Ok(SnapshotCheck::Matched)
        } else {
            Ok(SnapshotCheck::Diverged)
        }
    }

    fn can_tick(&self) -> bool {
        self.connection.is_some() && self.prediction_depth() < self.max_prediction
    }

    fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    fn state(&self) -> &S::State {
        &self.state
    }

    fn confirmed_frame(&self) -> Frame {
        self.sync_frame
    }

    fn disconnect(&mut self) {
        self.connection = None;
        self.client_frames.clear();
        self.server_frames.clear();
    }
}
