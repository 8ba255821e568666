//! Exponential backoff with jitter for live stream reconnects.

use rand::Rng;
use std::time::{Duration, Instant};

/// Backoff parameters. Defaults match the live resume controller:
/// 200ms initial, doubling, 5s per-step cap, 30s overall budget,
/// +-50% jitter.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(200),
            multiplier: 2.0,
            max_interval: Duration::from_secs(5),
            max_elapsed: Duration::from_secs(30),
            jitter: 0.5,
        }
    }
}

/// Stateful backoff sequence. `next()` returns the delay before the next
/// attempt, or `None` once the overall budget is exhausted.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    next_interval: Duration,
    started: Instant,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            next_interval: policy.initial_interval,
            started: Instant::now(),
        }
    }

    pub fn next(&mut self) -> Option<Duration> {
        if self.started.elapsed() >= self.policy.max_elapsed {
            return None;
        }
        let base = self.next_interval;
        let grown = base.mul_f64(self.policy.multiplier);
        self.next_interval = grown.min(self.policy.max_interval);

        if self.policy.jitter > 0.0 {
            let factor = rand::thread_rng()
                .gen_range(1.0 - self.policy.jitter..=1.0 + self.policy.jitter);
            Some(base.mul_f64(factor))
        } else {
            Some(base)
        }
    }

    /// Start over, e.g. after connectivity came back.
    pub fn reset(&mut self) {
        self.next_interval = self.policy.initial_interval;
        self.started = Instant::now();
    }
}
