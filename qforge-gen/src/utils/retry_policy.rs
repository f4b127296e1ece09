//! Bounded retry policy
//!
//! One policy type drives both the orchestrator's top-up batch (one attempt)
//! and the controller's whole-topic retry (`max_topic_retries` attempts).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, first attempt included
    pub max_attempts: u32,
    /// Pause before every attempt after the first
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Exactly one attempt
    pub fn once(delay: Duration) -> Self {
        Self::new(1, delay)
    }

    /// Whether another attempt may follow `completed` finished attempts
    pub fn should_retry(&self, completed: u32) -> bool {
        completed < self.max_attempts
    }

    /// Sleep owed before 1-based `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.delay
        }
    }

    /// Sleep `delay` (skipped when zero)
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(2000));
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay_for(1), Duration::ZERO);
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_once_and_zero_clamp() {
        assert!(!RetryPolicy::once(Duration::ZERO).should_retry(1));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
