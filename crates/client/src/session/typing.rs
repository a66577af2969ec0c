//! Turns compose-box activity into `typing_start` / `typing_stop` signals.

use std::time::Duration;

use parley_shared::OutboundIntent;
use tokio::time::Instant;

/// Debounces local input with a single quiet-period deadline.
///
/// The owner polls [`TypingDebouncer::poll`] once the deadline returned by
/// [`TypingDebouncer::deadline`] has passed.
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    quiet_period: Duration,
    is_typing: bool,
    deadline: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            is_typing: false,
            deadline: None,
        }
    }

    /// Record a keystroke. Yields `TypingStart` only on the first one.
    pub fn on_local_input(&mut self, now: Instant) -> Option<OutboundIntent> {
        self.deadline = Some(now + self.quiet_period);
        if self.is_typing {
            return None;
        }
        self.is_typing = true;
        Some(OutboundIntent::TypingStart)
    }

    /// Fire the quiet-period timer if it is due.
    pub fn poll(&mut self, now: Instant) -> Option<OutboundIntent> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.force_stop(),
            _ => None,
        }
    }

    /// Cancel the timer and end an active typing run. Idempotent.
    pub fn force_stop(&mut self) -> Option<OutboundIntent> {
        self.deadline = None;
        if !self.is_typing {
            return None;
        }
        self.is_typing = false;
        Some(OutboundIntent::TypingStop)
    }

    /// Drop all state without signalling, for a socket that is going away.
    pub fn reset(&mut self) {
        self.deadline = None;
        self.is_typing = false;
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
