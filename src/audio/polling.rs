use std::time::Duration;

use crate::config::TranscriptionConfig;

/// Delay schedule for polling a transcription job: exponential backoff
/// between `initial` and `max_interval`, bounded by `max_wait` in total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub max_wait: Duration,
}

impl PollPolicy {
    /// Delay before poll number `attempt` (0-based, counted after the first
    /// status check).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).min(self.max_interval.as_millis() as f64);
        Duration::from_millis(millis.max(0.0) as u64).max(self.initial.min(self.max_interval))
    }

    /// Delays until the total would exceed `max_wait`.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        let mut waited = Duration::ZERO;
        (0u32..).map(|attempt| self.delay(attempt)).take_while(move |delay| {
            waited += *delay;
            waited <= self.max_wait
        })
    }
}

impl From<&TranscriptionConfig> for PollPolicy {
    fn from(config: &TranscriptionConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.poll_interval_ms),
            max_interval: Duration::from_millis(config.max_poll_interval_ms.max(config.poll_interval_ms)),
            multiplier: config.backoff_multiplier,
            max_wait: Duration::from_secs(config.max_wait_secs),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(3),
            max_interval: Duration::from_secs(15),
            multiplier: 1.5,
            max_wait: Duration::from_secs(600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_until_capped() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(3000));
        assert_eq!(policy.delay(1), Duration::from_millis(4500));
        assert_eq!(policy.delay(2), Duration::from_millis(6750));
        assert_eq!(policy.delay(10), Duration::from_secs(15));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(15));
    }

    #[test]
    fn multiplier_below_one_keeps_fixed_interval() {
        let policy = PollPolicy {
            multiplier: 0.5,
            ..PollPolicy::default()
        };
        assert_eq!(policy.delay(5), Duration::from_secs(3));
    }

    #[test]
    fn schedule_stays_within_max_wait() {
        let policy = PollPolicy {
            initial: Duration::from_secs(1),
            max_interval: Duration::from_secs(4),
            multiplier: 2.0,
            max_wait: Duration::from_secs(15),
        };
        let delays: Vec<u64> = policy.schedule().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 4, 4]);
        assert!(delays.iter().sum::<u64>() <= 15);
    }

    #[test]
    fn built_from_config() {
        let config = crate::config::AppConfig::default().transcription;
        assert_eq!(PollPolicy::from(&config), PollPolicy::default());
    }
}
