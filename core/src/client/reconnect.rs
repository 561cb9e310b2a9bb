// Reconnect policy: how hard the socket client tries after losing the relay

use rand::Rng;
use std::time::Duration;

/// Exponential back-off with optional jitter
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Attempts per outage (`None` = keep trying)
    pub max_attempts: Option<u32>,
    /// Delay before the first attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor between attempts
    pub multiplier: f64,
    /// Random extra delay in `[0, jitter]`
    pub jitter: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: Duration::from_millis(100),
        }
    }
}

impl ReconnectPolicy {
    /// One retry, right away
    pub fn immediate_once() -> Self {
        Self {
            max_attempts: Some(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: Duration::ZERO,
        }
    }

    /// Never reconnect
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(0),
            ..Self::immediate_once()
        }
    }

    /// Delay before attempt number `attempt` (1-based), or `None` once the
    /// policy is exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }

        let exp = self.multiplier.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let base = self.initial_delay.as_secs_f64() * exp;
        let capped = Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()));

        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return Some(capped);
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        Some(capped + Duration::from_millis(extra))
    }
}
