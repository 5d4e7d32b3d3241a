use std::time::Duration;

use chrono::{DateTime, Utc};

use underdoc_core::config::{PollPolicy, RetryPolicy};

/// Capped exponential delay sequence: `initial, initial * m, initial * m², ...`
/// never exceeding `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            multiplier,
            max,
        }
    }

    pub fn for_retries(policy: &RetryPolicy) -> Self {
        Self::new(policy.base_delay, policy.multiplier, policy.max_delay)
    }

    /// Poll cadence starting at `interval` instead of the policy's default.
    pub fn for_polling(policy: &PollPolicy, interval: Duration) -> Self {
        Self::new(interval, policy.multiplier, policy.max_interval.max(interval))
    }

    /// Returns the current delay and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
        delay
    }
}

/// Parses a `Retry-After` header value: delta-seconds or an HTTP-date.
/// Dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
