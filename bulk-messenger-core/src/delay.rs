//! Randomized pacing between sends
//!
//! Every pause the send loop takes is drawn uniformly from a pair of
//! second-granularity bounds, so consecutive messages never go out on a
//! fixed cadence.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::PreconditionError;

/// Default bounds between the units sent to one contact
pub const DEFAULT_CONTENT_DELAY: DelayBounds = DelayBounds::new_unchecked(2, 5);

/// Default bounds between two contacts
pub const DEFAULT_CONTACT_DELAY: DelayBounds = DelayBounds::new_unchecked(5, 10);

/// Flat delay after a contact that failed
pub const FAILURE_FALLBACK_DELAY: Duration = Duration::from_secs(3);

/// Pick a delay in milliseconds, uniformly from `[min_secs * 1000, max_secs * 1000)`
///
/// Equal bounds yield exactly `min_secs * 1000`. Callers validate `min <= max`;
/// inverted bounds collapse to the minimum.
pub fn next_delay_millis(min_secs: u64, max_secs: u64) -> u64 {
    let low = min_secs.saturating_mul(1000);
    let high = max_secs.saturating_mul(1000);
    if high <= low {
        return low;
    }
    rand::thread_rng().gen_range(low..high)
}

/// Inclusive-exclusive bounds for a randomized delay, in whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayBounds {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl DelayBounds {
    /// Create bounds, rejecting a minimum above the maximum
    pub fn new(min_secs: u64, max_secs: u64) -> Result<Self, PreconditionError> {
        let bounds = Self::new_unchecked(min_secs, max_secs);
        bounds.validate()?;
        Ok(bounds)
    }

    const fn new_unchecked(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn validate(&self) -> Result<(), PreconditionError> {
        if self.min_secs > self.max_secs {
            return Err(PreconditionError::InvalidDelayBounds {
                min: self.min_secs,
                max: self.max_secs,
            });
        }
        Ok(())
    }

    /// Draw the next delay
    pub fn sample(&self) -> Duration {
        Duration::from_millis(next_delay_millis(self.min_secs, self.max_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_stays_within_bounds() {
        for _ in 0..1000 {
            let millis = next_delay_millis(2, 5);
            assert!((2000..5000).contains(&millis), "out of range: {}", millis);
        }
    }

    #[test]
    fn test_delay_is_not_constant() {
        let first = next_delay_millis(5, 10);
        let varied = (0..200).any(|_| next_delay_millis(5, 10) != first);
        assert!(varied);
    }

    #[test]
    fn test_equal_bounds() {
        assert_eq!(next_delay_millis(3, 3), 3000);
        assert_eq!(next_delay_millis(0, 0), 0);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let result = DelayBounds::new(10, 5);
        assert_eq!(
            result,
            Err(PreconditionError::InvalidDelayBounds { min: 10, max: 5 })
        );
        assert!(DelayBounds::new(5, 5).is_ok());
    }

    #[test]
    fn test_sample_uses_bounds() {
        let bounds = DelayBounds::new(1, 2).unwrap();
        for _ in 0..100 {
            let delay = bounds.sample();
            assert!(delay >= Duration::from_secs(1));
            assert!(delay < Duration::from_secs(2));
        }
    }

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_CONTENT_DELAY.min_secs, 2);
        assert_eq!(DEFAULT_CONTENT_DELAY.max_secs, 5);
        assert_eq!(DEFAULT_CONTACT_DELAY.min_secs, 5);
        assert_eq!(DEFAULT_CONTACT_DELAY.max_secs, 10);
        assert_eq!(FAILURE_FALLBACK_DELAY, Duration::from_secs(3));
    }
}
