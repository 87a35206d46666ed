use crate::event::Event;
use serde::{Deserialize, Serialize};

/// Logical simulation step counter. Frame 0 is the initial state; the first
/// finalized frame is 1.
pub type Frame = u32;

/// One frame's worth of events, optionally paired with the state it was
/// applied to.
///
/// Client predictions carry the pre-tick state; authoritative frames from the
/// server carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord<S, I> {
    pub frame: Frame,
    pub state: Option<S>,
    pub events: Vec<Event<I>>,
}

impl<S, I> FrameRecord<S, I> {
    pub fn predicted(frame: Frame, state: S, events: Vec<Event<I>>) -> Self {
        Self {
            frame,
            state: Some(state),
            events,
        }
    }

    pub fn authoritative(frame: Frame, events: Vec<Event<I>>) -> Self {
        Self {
            frame,
            state: None,
            events,
        }
    }
}
