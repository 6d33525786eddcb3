//! Run configuration

use crate::audit::AuditOptions;
use crate::error::ValidationError;
use std::time::Duration;

/// Upper bound on worker threads for one run
pub const MAX_CONCURRENCY_LIMIT: usize = 512;

/// Longest accepted per-attempt deadline
pub const MAX_PER_DEVICE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Options controlling one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Worker threads; at most this many devices are in flight
    pub max_concurrency: usize,
    /// Hard deadline for each connector attempt
    pub per_device_timeout: Duration,
    /// Extra attempts after a transient failure
    pub max_retries: u32,
    /// Delay before the first retry
    pub retry_backoff: Duration,
    /// Multiplier applied to the delay on each further retry
    pub backoff_factor: f64,
    /// Ceiling for any single retry delay
    pub max_backoff: Duration,
    /// Device output beyond this is cut off
    pub max_output_bytes: usize,
    /// Normalization for audit comparisons
    pub audit: AuditOptions,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            per_device_timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_backoff: Duration::from_secs(1),
            backoff_factor: 1.0,
            max_backoff: Duration::from_secs(60),
            max_output_bytes: 64 * 1024,
            audit: AuditOptions::default(),
        }
    }
}

impl RunConfig {
    /// Check that every option is in range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrency == 0 {
            return Err(ValidationError::config(
                "max_concurrency",
                "must be at least 1",
            ));
        }
        if self.max_concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(ValidationError::config(
                "max_concurrency",
                format!("must be at most {MAX_CONCURRENCY_LIMIT}"),
            ));
        }
        if self.per_device_timeout.is_zero() {
            return Err(ValidationError::config(
                "per_device_timeout",
                "must be greater than zero",
            ));
        }
        if self.per_device_timeout > MAX_PER_DEVICE_TIMEOUT {
            return Err(ValidationError::config(
                "per_device_timeout",
                format!("must be at most {}s", MAX_PER_DEVICE_TIMEOUT.as_secs()),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ValidationError::config(
                "backoff_factor",
                "must be a finite number >= 1.0",
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(ValidationError::config(
                "max_output_bytes",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Delay before retry number `retry` (0-indexed), capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay = self.retry_backoff.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = delay.min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrency, 10);
        assert_eq!(config.per_device_timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let cases = [
            RunConfig {
                max_concurrency: 0,
                ..RunConfig::default()
            },
            RunConfig {
                max_concurrency: MAX_CONCURRENCY_LIMIT + 1,
                ..RunConfig::default()
            },
            RunConfig {
                per_device_timeout: Duration::ZERO,
                ..RunConfig::default()
            },
            RunConfig {
                per_device_timeout: MAX_PER_DEVICE_TIMEOUT + Duration::from_millis(1),
                ..RunConfig::default()
            },
            RunConfig {
                per_device_timeout: Duration::from_secs(u64::MAX),
                ..RunConfig::default()
            },
            RunConfig {
                backoff_factor: 0.5,
                ..RunConfig::default()
            },
            RunConfig {
                backoff_factor: f64::NAN,
                ..RunConfig::default()
            },
            RunConfig {
                max_output_bytes: 0,
                ..RunConfig::default()
            },
        ];
        for config in cases {
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), ValidationErrorKind::InvalidConfig);
        }
    }

    #[test]
    fn test_longest_timeout_accepted() {
        let config = RunConfig {
            per_device_timeout: MAX_PER_DEVICE_TIMEOUT,
            ..RunConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_exponential_and_capped() {
        let config = RunConfig {
            retry_backoff: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_backoff: Duration::from_millis(500),
            ..RunConfig::default()
        };
        assert_eq!(config.backoff_for(0), Duration::from_millis(100));
        assert_eq!(config.backoff_for(1), Duration::from_millis(200));
        assert_eq!(config.backoff_for(2), Duration::from_millis(400));
        assert_eq!(config.backoff_for(3), Duration::from_millis(500));
        assert_eq!(config.backoff_for(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_constant_by_default() {
        let config = RunConfig::default();
        assert_eq!(config.backoff_for(0), Duration::from_secs(1));
        assert_eq!(config.backoff_for(5), Duration::from_secs(1));
    }
}
