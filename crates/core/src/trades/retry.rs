use std::time::Duration;

use rand::Rng;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Session recoveries tolerated per operation. These do not consume
    /// attempts.
    pub max_session_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay_ms: 1_000, max_delay_ms: 60_000, max_session_waits: 3 }
    }
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, base_delay_ms: 0, max_delay_ms: 0, max_session_waits: 3 }
    }

    /// `base * 2^attempt` plus up to one base of jitter, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let jitter = rand::thread_rng().gen_range(0..self.base_delay_ms);
        let delay_ms =
            self.base_delay_ms.saturating_mul(multiplier).saturating_add(jitter).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
