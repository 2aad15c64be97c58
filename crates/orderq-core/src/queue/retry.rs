//! Retry and visibility policies.

use std::collections::HashMap;
use std::time::Duration;

use crate::domain::TaskType;

/// Retry policy for failed deliveries: capped exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: 2.0,
            max_delay,
        }
    }

    /// Delay before the next delivery, given the number of failed attempts so far
    /// (1-indexed: `attempts = 1` after the first failure).
    ///
    /// delay = base_delay * multiplier^(attempts - 1), capped at max_delay.
    ///
    /// Example with base_delay=1s, multiplier=2.0, max_delay=60s:
    /// - attempt 1: 1s
    /// - attempt 2: 2s
    /// - attempt 3: 4s
    /// - attempt 7: 60s (capped, would be 64s)
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// How long a dequeued task stays invisible to other workers, per task kind.
///
/// Must exceed the worst-case handler time (store round trip + notification).
#[derive(Debug, Clone)]
pub struct VisibilityPolicy {
    default_timeout: Duration,
    per_kind: HashMap<TaskType, Duration>,
}

impl VisibilityPolicy {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            per_kind: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, task_type: TaskType, timeout: Duration) -> Self {
        self.per_kind.insert(task_type, timeout);
        self
    }

    pub fn timeout_for(&self, task_type: &TaskType) -> Duration {
        self.per_kind
            .get(task_type)
            .copied()
            .unwrap_or(self.default_timeout)
    }
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
