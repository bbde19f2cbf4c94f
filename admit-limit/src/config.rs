use std::num::NonZeroUsize;

/// Errors raised when a [`BucketConfig`] is built from invalid numbers.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The burst size must be finite and hold at least one whole token.
    #[error("capacity must be finite and at least 1, got {0}")]
    Capacity(f64),

    /// The refill rate must be a positive, finite number of tokens per second.
    #[error("refill rate must be positive and finite, got {0}")]
    RefillRate(f64),
}

/// Shape of every bucket created by a registry.
///
/// Both values are fractional. `capacity` caps the burst a client may issue
/// instantaneously, `refill_rate` is the sustained number of requests per
/// second a client may keep up indefinitely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketConfig {
    capacity: f64,
    refill_rate: f64,
}

impl BucketConfig {
    /// Creates a new `BucketConfig`.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The maximum number of tokens the bucket can hold.
    /// * `refill_rate` - Tokens added per second.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if either value is zero, negative, NaN or
    /// infinite. A capacity below one is also rejected: such a bucket could
    /// never hold a whole token and would deny every request.
    pub fn new(capacity: f64, refill_rate: f64) -> Result<Self, ConfigError> {
        if !(capacity.is_finite() && capacity >= 1.0) {
            return Err(ConfigError::Capacity(capacity));
        }
        if !(refill_rate.is_finite() && refill_rate > 0.0) {
            return Err(ConfigError::RefillRate(refill_rate));
        }
        Ok(Self {
            capacity,
            refill_rate,
        })
    }

    /// Whole-number configuration, which can't be invalid.
    pub fn per_second(capacity: NonZeroUsize, refill_per_sec: NonZeroUsize) -> Self {
        Self {
            capacity: capacity.get() as f64,
            refill_rate: refill_per_sec.get() as f64,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_accepts_fractional_values() {
        let config = BucketConfig::new(2.5, 0.25).unwrap();
        assert_eq!(config.capacity(), 2.5);
        assert_eq!(config.refill_rate(), 0.25);
    }

    #[test]
    fn it_rejects_non_positive_capacity() {
        assert_eq!(
            BucketConfig::new(0.0, 1.0),
            Err(ConfigError::Capacity(0.0))
        );
        assert_eq!(
            BucketConfig::new(-3.0, 1.0),
            Err(ConfigError::Capacity(-3.0))
        );
    }

    #[test]
    fn it_rejects_capacity_below_one_token() {
        assert_eq!(
            BucketConfig::new(0.5, 1.0),
            Err(ConfigError::Capacity(0.5))
        );
        assert!(BucketConfig::new(1.0, 1.0).is_ok());
        assert!(BucketConfig::new(1.5, 1.0).is_ok());
    }

    #[test]
    fn it_rejects_bad_refill_rate() {
        assert_eq!(
            BucketConfig::new(3.0, 0.0),
            Err(ConfigError::RefillRate(0.0))
        );
        assert!(matches!(
            BucketConfig::new(3.0, f64::INFINITY),
            Err(ConfigError::RefillRate(_))
        ));
        assert!(matches!(
            BucketConfig::new(3.0, f64::NAN),
            Err(ConfigError::RefillRate(_))
        ));
    }

    #[test]
    fn per_second_matches_new() {
        let config = BucketConfig::per_second(
            NonZeroUsize::new(3).unwrap(),
            NonZeroUsize::new(1).unwrap(),
        );
        assert_eq!(config, BucketConfig::new(3.0, 1.0).unwrap());
    }
}
