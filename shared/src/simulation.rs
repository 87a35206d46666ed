use crate::error::SyncError;
use crate::event::Event;
use crate::snapshot::{decode_state, encode_state};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// The deterministic step function driven by the server and every client.
///
/// `update` must be pure with respect to its inputs: the same state and the
/// same ordered events always produce the same resulting state. Rollback
/// clients call it several times for the same logical frame.
pub trait Simulation {
    type State: Clone + PartialEq + Debug + Serialize + DeserializeOwned;
    type Input: Clone + PartialEq + Debug + Serialize + DeserializeOwned;

    fn initial_state(&self) -> Self::State;

    fn update(&self, state: &mut Self::State, events: &[Event<Self::Input>]);

    fn serialize(&self, state: &Self::State) -> Result<Vec<u8>, SyncError> {
        encode_state(state)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Self::State, SyncError> {
        decode_state(bytes)
    }
}
