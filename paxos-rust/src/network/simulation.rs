use std::time::Duration;

use rand::Rng;

use crate::error::{PaxosError, Result};

/// Faults injected on the request path between a proposer and an acceptor.
///
/// A dropped request looks exactly like an acceptor that chose to ignore it:
/// the sender sees a successful send and never gets an answer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinkFaults {
    /// Probability in `[0, 1]` that a request is silently lost.
    pub drop_rate: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl LinkFaults {
    pub fn reliable() -> Self {
        LinkFaults::default()
    }

    pub fn lossy(drop_rate: f64) -> Self {
        LinkFaults {
            drop_rate,
            ..LinkFaults::default()
        }
    }

    pub fn with_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.drop_rate) {
            return Err(PaxosError::InvalidConfig(format!(
                "drop_rate must be within [0, 1], got {}",
                self.drop_rate
            )));
        }
        if self.min_delay > self.max_delay {
            return Err(PaxosError::InvalidConfig(format!(
                "min_delay {:?} exceeds max_delay {:?}",
                self.min_delay, self.max_delay
            )));
        }
        Ok(())
    }

    pub fn is_reliable(&self) -> bool {
        self.drop_rate <= 0.0 && self.max_delay.is_zero()
    }

    /// Rolls whether the next message is lost.
    pub fn should_drop(&self) -> bool {
        if self.drop_rate <= 0.0 {
            return false;
        }
        if self.drop_rate >= 1.0 {
            return true;
        }
        rand::rng().random_bool(self.drop_rate)
    }

    /// Picks a transit delay within `[min_delay, max_delay]`.
    pub fn sample_delay(&self) -> Duration {
        if self.max_delay.is_zero() {
            return Duration::ZERO;
        }
        rand::rng().random_range(self.min_delay..=self.max_delay)
    }
}
