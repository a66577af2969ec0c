//! Decides when a dropped session is retried.

use tokio::time::Instant;

use crate::ws::{ConnectionState, ReconnectConfig};

/// A single retry timer, armed by unexpected closes and disarmed by success.
///
/// With the default [`ReconnectConfig`] the timer ticks every 5 seconds
/// until a connection opens, with no attempt limit.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    next_attempt: Option<Instant>,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            next_attempt: None,
            attempts: 0,
        }
    }

    /// A connection opened; stop retrying.
    pub fn on_connected(&mut self) {
        if self.next_attempt.is_some() {
            tracing::debug!(attempts = self.attempts, "reconnected, retry timer stopped");
        }
        self.cancel();
    }

    /// A live socket went away without a newer `connect` superseding it.
    pub fn on_disconnected(&mut self, was_clean: bool, now: Instant) {
        tracing::debug!(was_clean, "unexpected disconnect");
        self.start(now);
    }

    /// Returns `true` if the caller should reconnect right away. The pending
    /// timer is cancelled in that case.
    pub fn on_visibility_regained(&mut self, state: ConnectionState) -> bool {
        if !matches!(state, ConnectionState::Closed | ConnectionState::Errored) {
            return false;
        }
        self.cancel();
        true
    }

    /// Arm the timer. A no-op while it is already running.
    pub fn start(&mut self, now: Instant) {
        if self.next_attempt.is_some() {
            return;
        }
        if self.config.exhausted(self.attempts) {
            tracing::warn!(attempts = self.attempts, "giving up on reconnecting");
            return;
        }
        let delay = self.config.delay_for_attempt(self.attempts);
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
        self.next_attempt = Some(now + delay);
    }

    /// Returns `true` when a retry is due, and schedules the next tick.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_attempt {
            Some(at) if at <= now => {}
            _ => return false,
        }

        self.attempts = self.attempts.saturating_add(1);
        self.next_attempt = if self.config.exhausted(self.attempts) {
            None
        } else {
            Some(now + self.config.delay_for_attempt(self.attempts))
        };
        true
    }

    pub fn cancel(&mut self) {
        self.next_attempt = None;
        self.attempts = 0;
    }

    pub fn is_active(&self) -> bool {
        self.next_attempt.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next_attempt
    }

    /// Retries fired since the last success or cancel.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
