//! Snapshot codec and rewind checkpoints.

use crate::error::SyncError;
use crate::frame::Frame;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes simulation state for the initial sync and periodic snapshots.
pub fn encode_state<S: Serialize>(state: &S) -> Result<Vec<u8>, SyncError> {
    bincode::serialize(state).map_err(SyncError::Snapshot)
}

pub fn decode_state<S: DeserializeOwned>(bytes: &[u8]) -> Result<S, SyncError> {
    bincode::deserialize(bytes).map_err(SyncError::Snapshot)
}

/// State captured at a known frame.
///
/// Copies are plain clones of the state value. Nothing is re-parsed, so float
/// fields come back exactly as they went in.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<S> {
    pub frame: Frame,
    pub state: S,
}

impl<S: Clone> Snapshot<S> {
    pub fn capture(frame: Frame, state: &S) -> Self {
        Self {
            frame,
            state: state.clone(),
        }
    }

    /// Returns a fresh copy of the captured state.
    pub fn restore(&self) -> S {
        self.state.clone()
    }
}
