use std::collections::VecDeque;
use std::time::{Duration, Instant};

const HISTORY_LEN: usize = 50;

/// Tracks the spacing between authoritative frames as seen by a client.
///
/// In lockstep this is the effective tick rate of the whole session, since
/// the server only advances once the slowest client has reported.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last_mark: Instant,
    last: Duration,
    history: VecDeque<Duration>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_mark: Instant::now(),
            last: Duration::ZERO,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    pub fn reset(&mut self) {
        self.last_mark = Instant::now();
        self.last = Duration::ZERO;
        self.history.clear();
    }

    /// Records that a frame arrived now.
    pub fn mark(&mut self) {
        self.mark_at(Instant::now());
    }

    fn mark_at(&mut self, now: Instant) {
        self.last = now.saturating_duration_since(self.last_mark);
        self.last_mark = now;
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(self.last);
    }

    pub fn last(&self) -> Duration {
        self.last
    }

    pub fn average(&self) -> Duration {
        if self.history.is_empty() {
            return Duration::ZERO;
        }
        self.history.iter().sum::<Duration>() / self.history.len() as u32
    }

    pub fn samples(&self) -> usize {
        self.history.len()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
