//! Engine configuration
//!
//! Timestamps are unit-agnostic: the engine only compares values in the one
//! unit declared here. [`TimeUnit`] exists so duration limits can be stated
//! in a coarser unit than the record timestamps and converted once at build
//! time, the way the original monitoring pipeline configured its filters.
//!
//! Both limits default to [`UNBOUNDED`], which disables timeout eviction
//! entirely: traces then leave the registry only by completing or at
//! shutdown.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel disabling a time limit. Unit-independent: never converted.
pub const UNBOUNDED: i64 = i64::MAX;

/// Units a timestamp or duration value can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    fn nanos_per_unit(self) -> i64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
        }
    }

    /// Convert `value` expressed in `from` units into `self` units.
    /// Conversions to a finer unit saturate at `i64::MAX`/`i64::MIN`;
    /// conversions to a coarser unit truncate toward zero.
    pub fn convert(self, value: i64, from: TimeUnit) -> i64 {
        let from_nanos = from.nanos_per_unit();
        let to_nanos = self.nanos_per_unit();
        if from_nanos == to_nanos {
            value
        } else if from_nanos > to_nanos {
            value.saturating_mul(from_nanos / to_nanos)
        } else {
            value / (to_nanos / from_nanos)
        }
    }
}

/// Configuration failures, reported at build time and never clamped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max trace duration must be non-negative, got {0}")]
    NegativeDuration(i64),
    #[error("max trace timeout must be non-negative, got {0}")]
    NegativeTimeout(i64),
}

/// Validated engine configuration.
///
/// `max_trace_duration` bounds the span between a trace's earliest and
/// latest event; `max_trace_timeout` bounds how long a trace may stay
/// silent while the watermark advances. Both are held in `time_unit` units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    pub time_unit: TimeUnit,
    pub max_trace_duration: i64,
    pub max_trace_timeout: i64,
}

impl ReconstructionConfig {
    pub fn builder() -> ReconstructionConfigBuilder {
        ReconstructionConfigBuilder::default()
    }

    /// Unbounded configuration: no timeout eviction at all.
    pub fn unbounded() -> Self {
        Self {
            time_unit: TimeUnit::Nanoseconds,
            max_trace_duration: UNBOUNDED,
            max_trace_timeout: UNBOUNDED,
        }
    }

    /// False iff both limits are [`UNBOUNDED`], in which case the engine
    /// skips timeout scanning entirely.
    pub fn timeout_enabled(&self) -> bool {
        !(self.max_trace_duration == UNBOUNDED && self.max_trace_timeout == UNBOUNDED)
    }
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Builder for [`ReconstructionConfig`]. Limits may be given in any unit;
/// they are converted into the engine time unit at [`build`] time.
///
/// [`build`]: ReconstructionConfigBuilder::build
#[derive(Debug, Clone)]
pub struct ReconstructionConfigBuilder {
    time_unit: TimeUnit,
    max_trace_duration: (i64, TimeUnit),
    max_trace_timeout: (i64, TimeUnit),
}

impl Default for ReconstructionConfigBuilder {
    fn default() -> Self {
        Self {
            time_unit: TimeUnit::Nanoseconds,
            max_trace_duration: (UNBOUNDED, TimeUnit::Nanoseconds),
            max_trace_timeout: (UNBOUNDED, TimeUnit::Nanoseconds),
        }
    }
}

impl ReconstructionConfigBuilder {
    /// Unit of record timestamps and of the built limits.
    pub fn time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = unit;
        self
    }

    pub fn max_trace_duration(mut self, value: i64, unit: TimeUnit) -> Self {
        self.max_trace_duration = (value, unit);
        self
    }

    pub fn max_trace_timeout(mut self, value: i64, unit: TimeUnit) -> Self {
        self.max_trace_timeout = (value, unit);
        self
    }

    pub fn build(self) -> Result<ReconstructionConfig, ConfigError> {
        let (duration, duration_unit) = self.max_trace_duration;
        if duration < 0 {
            return Err(ConfigError::NegativeDuration(duration));
        }
        let (timeout, timeout_unit) = self.max_trace_timeout;
        if timeout < 0 {
            return Err(ConfigError::NegativeTimeout(timeout));
        }
        let convert = |value: i64, unit: TimeUnit| {
            if value == UNBOUNDED {
                UNBOUNDED
            } else {
                self.time_unit.convert(value, unit)
            }
        };
        Ok(ReconstructionConfig {
            time_unit: self.time_unit,
            max_trace_duration: convert(duration, duration_unit),
            max_trace_timeout: convert(timeout, timeout_unit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let config = ReconstructionConfig::default();
        assert_eq!(config.max_trace_duration, UNBOUNDED);
        assert_eq!(config.max_trace_timeout, UNBOUNDED);
        assert!(!config.timeout_enabled());
    }

    #[test]
    fn test_one_bounded_limit_enables_timeouts() {
        let config = ReconstructionConfig::builder()
            .max_trace_timeout(500, TimeUnit::Nanoseconds)
            .build()
            .unwrap();
        assert!(config.timeout_enabled());
        assert_eq!(config.max_trace_duration, UNBOUNDED);
        assert_eq!(config.max_trace_timeout, 500);
    }

    #[test]
    fn test_unit_conversion_at_build() {
        let config = ReconstructionConfig::builder()
            .time_unit(TimeUnit::Nanoseconds)
            .max_trace_duration(2, TimeUnit::Milliseconds)
            .build()
            .unwrap();
        assert_eq!(config.max_trace_duration, 2_000_000);
    }

    #[test]
    fn test_unbounded_is_never_converted() {
        let config = ReconstructionConfig::builder()
            .time_unit(TimeUnit::Seconds)
            .max_trace_duration(UNBOUNDED, TimeUnit::Nanoseconds)
            .build()
            .unwrap();
        assert_eq!(config.max_trace_duration, UNBOUNDED);
    }

    #[test]
    fn test_negative_limits_are_rejected() {
        let err = ReconstructionConfig::builder()
            .max_trace_duration(-1, TimeUnit::Seconds)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NegativeDuration(-1));

        let err = ReconstructionConfig::builder()
            .max_trace_timeout(-7, TimeUnit::Seconds)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NegativeTimeout(-7));
    }

    #[test]
    fn test_convert_truncates_toward_zero() {
        assert_eq!(TimeUnit::Milliseconds.convert(1_999_999, TimeUnit::Nanoseconds), 1);
        assert_eq!(TimeUnit::Seconds.convert(999, TimeUnit::Milliseconds), 0);
    }

    #[test]
    fn test_convert_saturates_on_overflow() {
        assert_eq!(
            TimeUnit::Nanoseconds.convert(i64::MAX / 2, TimeUnit::Seconds),
            i64::MAX
        );
    }
}
