use crate::error::{PaxosError, Result};

/// Majority arithmetic over a fixed roster of acceptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quorum {
    acceptors: usize,
    threshold: usize,
}

impl Quorum {
    /// `⌊n/2⌋ + 1` out of `n`.
    pub fn majority_of(acceptors: usize) -> Self {
        Quorum {
            acceptors,
            threshold: acceptors / 2 + 1,
        }
    }

    /// Accepts a caller-supplied threshold only if it is the majority of `acceptors`.
    pub fn with_threshold(acceptors: usize, threshold: usize) -> Result<Self> {
        let quorum = Self::majority_of(acceptors);
        if acceptors == 0 || threshold != quorum.threshold {
            return Err(PaxosError::InvalidConfig(format!(
                "majority of {} acceptors must be {}, got {}",
                acceptors, quorum.threshold, threshold
            )));
        }
        Ok(quorum)
    }

    pub fn acceptors(&self) -> usize {
        self.acceptors
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_reached(&self, responses: usize) -> bool {
        responses >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_thresholds() {
        assert_eq!(Quorum::majority_of(1).threshold(), 1);
        assert_eq!(Quorum::majority_of(2).threshold(), 2);
        assert_eq!(Quorum::majority_of(3).threshold(), 2);
        assert_eq!(Quorum::majority_of(4).threshold(), 3);
        assert_eq!(Quorum::majority_of(5).threshold(), 3);
    }

    #[test]
    fn is_reached_at_threshold() {
        let q = Quorum::majority_of(3);
        assert!(!q.is_reached(1));
        assert!(q.is_reached(2));
        assert!(q.is_reached(3));
    }

    #[test]
    fn threshold_must_be_majority() {
        assert!(Quorum::with_threshold(5, 3).is_ok());
        assert!(Quorum::with_threshold(5, 2).is_err());
        assert!(Quorum::with_threshold(5, 4).is_err());
        assert!(Quorum::with_threshold(0, 1).is_err());
    }
}
