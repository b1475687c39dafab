//! Deterministic exponential backoff schedule for reconnection attempts.

use std::time::Duration;

use crate::error::Error;

/// Immutable backoff tuning, fixed for the lifetime of a socket.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second retry (the first retry is immediate).
    pub min_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied for each subsequent attempt.
    pub factor: f64,
    /// Attempts allowed since the last successful open before giving up.
    pub max_attempts: u32,
}

impl BackoffConfig {
    /// Rejects configurations the schedule cannot honour. Nothing is
    /// silently clamped.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.factor.is_finite() || self.factor <= 0.0 {
            return Err(Error::InvalidConfig(
                "reconnect_backoff_factor must be a positive number".into(),
            ));
        }
        if self.max_delay < self.min_delay {
            return Err(Error::InvalidConfig(
                "max_reconnect_delay must be >= min_reconnect_delay".into(),
            ));
        }
        Ok(())
    }

    /// Delay before reconnection attempt `attempt` (0-based).
    ///
    /// A single transient failure is not penalized: attempt 0 retries
    /// immediately. From attempt 1 on the delay grows geometrically from
    /// `min_delay` up to `max_delay`. No jitter, so schedules are
    /// reproducible.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = (attempt - 1).min(63) as i32;
        let secs = self.min_delay.as_secs_f64() * self.factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}
