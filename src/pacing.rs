//! Delay scheduling for dispatch pacing.
//!
//! Later targets in a batch wait longer: the computed delay grows linearly
//! with the step index, plus a bounded uniform jitter, spreading one batch's
//! load over time.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Pacing policy for one dispatch run. All fields are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayPolicy {
    /// Flat wait applied before every step.
    pub base_ms: u64,

    /// Additional wait per step index.
    pub per_step_increment_ms: u64,

    /// Upper bound of the uniform random jitter added to each wait.
    pub random_jitter_max_ms: u64,

    /// Wait after a failed step, replacing the normal delay for the step
    /// that follows.
    pub error_penalty_ms: u64,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            base_ms: 30_000,
            per_step_increment_ms: 5_000,
            random_jitter_max_ms: 60_000,
            error_penalty_ms: 120_000,
        }
    }
}

impl DelayPolicy {
    /// A policy with no waits at all.
    pub fn zero() -> Self {
        Self {
            base_ms: 0,
            per_step_increment_ms: 0,
            random_jitter_max_ms: 0,
            error_penalty_ms: 0,
        }
    }

    pub fn error_penalty(&self) -> Duration {
        Duration::from_millis(self.error_penalty_ms)
    }
}

/// Compute the pacing delay before a step.
///
/// Deterministic in its base and increment terms (non-decreasing as the step
/// index grows), plus a uniform jitter in `[0, random_jitter_max_ms]` drawn
/// from the injected generator.
pub fn delay_for<R: Rng + ?Sized>(step_index: usize, policy: &DelayPolicy, rng: &mut R) -> Duration {
    let fixed = policy
        .base_ms
        .saturating_add((step_index as u64).saturating_mul(policy.per_step_increment_ms));
    let jitter = if policy.random_jitter_max_ms == 0 {
        0
    } else {
        rng.random_range(0..=policy.random_jitter_max_ms)
    };
    Duration::from_millis(fixed.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn fixed_terms_are_non_decreasing() {
        let policy = DelayPolicy {
            base_ms: 1_000,
            per_step_increment_ms: 250,
            random_jitter_max_ms: 0,
            error_penalty_ms: 0,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let mut previous = Duration::ZERO;
        for step in 0..50 {
            let delay = delay_for(step, &policy, &mut rng);
            assert!(delay >= previous, "delay shrank at step {step}");
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(1_000 + 49 * 250));
    }

    #[test]
    fn jitter_is_bounded() {
        let policy = DelayPolicy {
            base_ms: 100,
            per_step_increment_ms: 0,
            random_jitter_max_ms: 50,
            error_penalty_ms: 0,
        };
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            let delay = delay_for(0, &policy, &mut rng);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn seeded_generators_replay_identically() {
        let policy = DelayPolicy {
            base_ms: 10,
            per_step_increment_ms: 5,
            random_jitter_max_ms: 1_000,
            error_penalty_ms: 0,
        };
        let mut a = StdRng::seed_from_u64(77);
        let mut b = StdRng::seed_from_u64(77);
        for step in 0..20 {
            assert_eq!(delay_for(step, &policy, &mut a), delay_for(step, &policy, &mut b));
        }
    }
}
