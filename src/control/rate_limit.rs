//! Minimum-interval enforcement between consecutive decisions.

use std::time::{Duration, Instant};

/// Tracks the timestamp of the last successful decision. Pure function of
/// elapsed wall-clock time and the configured interval; no other state.
#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    last_decision: Option<Instant>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_decision: None,
        }
    }

    /// Whether the cooldown has elapsed since the last decision.
    pub fn is_ready(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Time left until the next decision is allowed; zero when ready.
    pub fn remaining(&self) -> Duration {
        match self.last_decision {
            None => Duration::ZERO,
            Some(last) => self.cooldown.saturating_sub(last.elapsed()),
        }
    }

    /// Record a successful decision, restarting the cooldown.
    pub fn record_decision(&mut self) {
        self.last_decision = Some(Instant::now());
    }
}
