//! Token bucket with lazy refill
//!
//! Tokens are recomputed on demand from the time elapsed since the last
//! refill, so an idle limiter keeps no timers alive.

use std::time::Duration;
use tokio::time::Instant;

/// Slack for float error when deciding whether a whole token has accrued
const TOKEN_EPSILON: f64 = 1e-9;

/// Shortest wait the drain loop will schedule
const MIN_WAIT: Duration = Duration::from_millis(1);

/// How tokens come back into the bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefillModel {
    /// `per_sec` tokens per second, accrued continuously
    Continuous { per_sec: f64 },

    /// Full refill to capacity once `window` has passed since the last refill
    Window { window: Duration },
}

#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    model: RefillModel,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(capacity: f64, model: RefillModel, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            model,
            last_refill: now,
        }
    }

    /// Tokens available as of the last refill
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Bring the token count up to date
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        match self.model {
            RefillModel::Continuous { per_sec } => {
                if elapsed > Duration::ZERO {
                    self.tokens = (self.tokens + elapsed.as_secs_f64() * per_sec).min(self.capacity);
                    self.last_refill = now;
                }
            }
            RefillModel::Window { window } => {
                if elapsed >= window {
                    self.tokens = self.capacity;
                    self.last_refill = now;
                }
            }
        }
    }

    /// Refill, then withdraw one token if a whole one is available
    pub fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.has_token() {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }

    /// Time until a whole token is available, zero if one already is
    ///
    /// Call after `refill` so the count is current.
    pub fn time_until_token(&self, now: Instant) -> Duration {
        if self.has_token() {
            return Duration::ZERO;
        }
        let wait = match self.model {
            RefillModel::Continuous { per_sec } => {
                Duration::try_from_secs_f64((1.0 - self.tokens) / per_sec).unwrap_or(Duration::MAX)
            }
            RefillModel::Window { window } => {
                let elapsed = now.saturating_duration_since(self.last_refill);
                window.saturating_sub(elapsed)
            }
        };
        wait.max(MIN_WAIT)
    }

    fn has_token(&self) -> bool {
        self.tokens + TOKEN_EPSILON >= 1.0
    }
}
