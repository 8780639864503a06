//! Shared backoff policy, reused by the stage runtime's retry loop, the
//! `recover` combinator's `Retry` strategy, and the scheduler's
//! per-execution retry policy.
//!
//! Trimmed to the two shapes this engine's call sites actually need.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the delay between retry attempts grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BackoffPolicy {
    /// The same delay before every retry.
    Fixed {
        /// Delay between attempts.
        delay: Duration,
    },
    /// `base_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
    Exponential {
        /// Delay before the first retry.
        base_delay: Duration,
        /// Growth factor applied per attempt.
        multiplier: f64,
        /// Upper bound on the computed delay.
        max_delay: Option<Duration>,
        /// Whether to randomize the computed delay to avoid thundering
        /// herds of synchronized retries.
        jitter: bool,
    },
}

impl BackoffPolicy {
    /// Standard exponential backoff with doubling and no cap.
    #[must_use]
    pub fn exponential(base_delay: Duration) -> Self {
        Self::Exponential {
            base_delay,
            multiplier: 2.0,
            max_delay: None,
            jitter: false,
        }
    }

    /// Exponential backoff capped at `max_delay`, matching the
    /// scheduler's "exponential backoff capped at 30s" requirement.
    #[must_use]
    pub fn exponential_capped(base_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential {
            base_delay,
            multiplier: 2.0,
            max_delay: Some(max_delay),
            jitter: false,
        }
    }

    /// The delay to wait before retry attempt `attempt` (1-indexed: the
    /// delay observed before the *first* retry, i.e. after the initial
    /// attempt fails, is `delay_for(1)`).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,
            Self::Exponential {
                base_delay,
                multiplier,
                max_delay,
                jitter,
            } => {
                let factor = multiplier.powi(i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX));
                let computed_ms = (base_delay.as_millis() as f64 * factor).max(0.0);
                let mut computed = Duration::from_millis(computed_ms as u64);
                if let Some(cap) = max_delay {
                    computed = computed.min(*cap);
                }
                if *jitter && !computed.is_zero() {
                    let half = computed.as_millis() as u64 / 2;
                    let extra = rand::thread_rng().gen_range(0..=half.max(1));
                    computed = Duration::from_millis(half + extra);
                }
                computed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_is_constant() {
        let policy = BackoffPolicy::Fixed {
            delay: Duration::from_millis(10),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(5), Duration::from_millis(10));
    }

    #[test]
    fn exponential_doubles() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
    }

    #[test]
    fn exponential_capped_respects_max() {
        let policy =
            BackoffPolicy::exponential_capped(Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }
}
