//! Partner typing indicator: `Idle` / `Typing` with a re-armable timeout.
//!
//! Every qualifying signal bumps the generation; the actor arms a timer that
//! reports back with that generation. Only the timer for the latest
//! generation may move the state back to `Idle`.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TypingPhase {
    Idle,
    Typing,
}

#[derive(Debug, Clone)]
pub(super) struct TypingState {
    pub(super) peer_id: String,
    pub(super) is_typing: bool,
    pub(super) expires_at: Instant,
}

pub(super) struct TypingIndicator {
    timeout: Duration,
    generation: u64,
    state: Option<TypingState>,
}

impl TypingIndicator {
    pub(super) fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            generation: 0,
            state: None,
        }
    }

    pub(super) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(super) fn phase(&self) -> TypingPhase {
        match &self.state {
            Some(s) if s.is_typing => TypingPhase::Typing,
            _ => TypingPhase::Idle,
        }
    }

    pub(super) fn is_typing(&self) -> bool {
        self.phase() == TypingPhase::Typing
    }

    pub(super) fn state(&self) -> Option<&TypingState> {
        self.state.as_ref()
    }

    /// A qualifying signal from `peer_id`. Returns the generation the caller
    /// must arm a timer for.
    pub(super) fn signal(&mut self, peer_id: &str, now: Instant) -> u64 {
        self.generation += 1;
        self.state = Some(TypingState {
            peer_id: peer_id.to_string(),
            is_typing: true,
            expires_at: now + self.timeout,
        });
        self.generation
    }

    /// Timer callback. Returns true when this moved the state to `Idle`.
    pub(super) fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.is_typing() {
            return false;
        }
        self.state = None;
        true
    }

    /// Drop any typing state and invalidate outstanding timers.
    pub(super) fn clear(&mut self) {
        self.generation += 1;
        self.state = None;
    }
}
