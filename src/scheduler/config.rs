//! Limiter configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::bucket::RefillModel;
use super::error::SchedulerError;
use super::jitter::Jitter;

/// How a limiter's bucket is replenished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RefillKind {
    /// Tokens trickle back at `refill-rate` per second
    #[default]
    Continuous,

    /// The bucket refills to capacity once every `window-ms`
    Window,
}

/// Rate budget for one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LimiterConfig {
    /// Maximum tokens the bucket holds (burst size)
    pub capacity: f64,

    /// Refill model
    pub refill: RefillKind,

    /// Tokens per second (continuous model)
    pub refill_rate: f64,

    /// Window length in milliseconds (window model)
    pub window_ms: u64,

    /// Lower bound of the humanization delay
    pub min_delay_ms: u64,

    /// Upper bound of the humanization delay
    pub max_delay_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 10.0,
            refill: RefillKind::Continuous,
            refill_rate: 0.2,
            window_ms: 60_000,
            min_delay_ms: 1137,
            max_delay_ms: 3219,
        }
    }
}

impl LimiterConfig {
    /// Continuous-refill budget with no humanization delay
    pub fn continuous(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill: RefillKind::Continuous,
            refill_rate,
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..Default::default()
        }
    }

    /// Fixed-window budget with no humanization delay
    pub fn window(capacity: f64, window: Duration) -> Self {
        Self {
            capacity,
            refill: RefillKind::Window,
            window_ms: window.as_millis() as u64,
            min_delay_ms: 0,
            max_delay_ms: 0,
            ..Default::default()
        }
    }

    /// Set the humanization delay bounds
    pub fn with_delay(mut self, min_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.min_delay_ms = min_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Reject budgets that would stall the limiter forever
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !self.capacity.is_finite() || self.capacity < 1.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "capacity must be a finite number >= 1, got {}",
                self.capacity
            )));
        }

        match self.refill {
            RefillKind::Continuous => {
                if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
                    return Err(SchedulerError::InvalidConfig(format!(
                        "refill-rate must be a finite number > 0, got {}",
                        self.refill_rate
                    )));
                }
                // A one-token wait has to be representable as a sleep
                if Duration::try_from_secs_f64(1.0 / self.refill_rate).is_err() {
                    return Err(SchedulerError::InvalidConfig(format!(
                        "refill-rate {} is too small to ever refill a token",
                        self.refill_rate
                    )));
                }
            }
            RefillKind::Window => {
                if self.window_ms == 0 {
                    return Err(SchedulerError::InvalidConfig("window-ms must be > 0".to_string()));
                }
            }
        }

        if self.min_delay_ms > self.max_delay_ms {
            return Err(SchedulerError::InvalidConfig(format!(
                "min-delay-ms ({}) exceeds max-delay-ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }

        Ok(())
    }

    /// Refill model for the token bucket
    pub fn refill_model(&self) -> RefillModel {
        match self.refill {
            RefillKind::Continuous => RefillModel::Continuous {
                per_sec: self.refill_rate,
            },
            RefillKind::Window => RefillModel::Window {
                window: Duration::from_millis(self.window_ms),
            },
        }
    }

    /// Humanization delay sampler
    pub fn jitter(&self) -> Jitter {
        Jitter::new(
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    /// Average dispatches per second once the initial burst is spent
    pub fn steady_rate(&self) -> f64 {
        match self.refill {
            RefillKind::Continuous => self.refill_rate,
            RefillKind::Window => self.capacity / (self.window_ms as f64 / 1000.0),
        }
    }
}

/// A limiter entry as written in a config file
///
/// Every field is optional; unset fields keep the value of the budget being
/// overridden, so `claude: {capacity: 1}` changes only claude's burst size.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct LimiterOverride {
    #[serde(alias = "max-tokens")]
    pub capacity: Option<f64>,
    pub refill: Option<RefillKind>,
    pub refill_rate: Option<f64>,
    pub window_ms: Option<u64>,
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

impl LimiterOverride {
    /// Layer the set fields over `base`
    pub fn apply_to(self, base: LimiterConfig) -> LimiterConfig {
        LimiterConfig {
            capacity: self.capacity.unwrap_or(base.capacity),
            refill: self.refill.unwrap_or(base.refill),
            refill_rate: self.refill_rate.unwrap_or(base.refill_rate),
            window_ms: self.window_ms.unwrap_or(base.window_ms),
            min_delay_ms: self.min_delay_ms.unwrap_or(base.min_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LimiterConfig::default();
        assert_eq!(config.capacity, 10.0);
        assert_eq!(config.refill, RefillKind::Continuous);
        assert_eq!(config.refill_rate, 0.2);
        assert_eq!(config.min_delay_ms, 1137);
        assert_eq!(config.max_delay_ms, 3219);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = LimiterConfig::continuous(0.0, 1.0);
        assert!(matches!(config.validate(), Err(SchedulerError::InvalidConfig(_))));
    }

    #[test]
    fn test_fractional_capacity_rejected() {
        // A bucket that can never hold a whole token would never dispatch
        let config = LimiterConfig::continuous(0.5, 1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_refill_rejected() {
        assert!(LimiterConfig::continuous(5.0, 0.0).validate().is_err());
        assert!(LimiterConfig::continuous(5.0, -1.0).validate().is_err());
        assert!(LimiterConfig::continuous(5.0, f64::NAN).validate().is_err());
        assert!(LimiterConfig::continuous(f64::INFINITY, 1.0).validate().is_err());
    }

    #[test]
    fn test_vanishing_refill_rejected() {
        let err = LimiterConfig::continuous(1.0, 1e-20).validate().unwrap_err();
        assert!(err.to_string().contains("too small"));

        // Slow but representable
        assert!(LimiterConfig::continuous(1.0, 1e-6).validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(LimiterConfig::window(5.0, Duration::ZERO).validate().is_err());
        assert!(LimiterConfig::window(5.0, Duration::from_secs(60)).validate().is_ok());
    }

    #[test]
    fn test_inverted_delay_rejected() {
        let config = LimiterConfig::continuous(5.0, 1.0).with_delay(500, 100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_config_ignores_refill_rate() {
        let config = LimiterConfig {
            refill_rate: 0.0,
            ..LimiterConfig::window(5.0, Duration::from_secs(1))
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_refill_model() {
        let config = LimiterConfig::continuous(3.0, 0.5);
        assert_eq!(config.refill_model(), RefillModel::Continuous { per_sec: 0.5 });

        let config = LimiterConfig::window(100.0, Duration::from_secs(60));
        assert_eq!(
            config.refill_model(),
            RefillModel::Window {
                window: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn test_steady_rate() {
        assert_eq!(LimiterConfig::continuous(3.0, 0.5).steady_rate(), 0.5);
        assert_eq!(LimiterConfig::window(30.0, Duration::from_secs(60)).steady_rate(), 0.5);
    }

    #[test]
    fn test_yaml_parse() {
        let yaml = r#"
max-tokens: 3
refill-rate: 0.2
min-delay-ms: 2413
max-delay-ms: 6897
"#;
        let entry: LimiterOverride = serde_yaml::from_str(yaml).unwrap();
        let config = entry.apply_to(LimiterConfig::default());
        assert_eq!(config.capacity, 3.0);
        assert_eq!(config.refill, RefillKind::Continuous);
        assert_eq!(config.refill_rate, 0.2);
        assert_eq!(config.min_delay_ms, 2413);

        let yaml = "capacity: 100\nrefill: window\nwindow-ms: 60000\n";
        let entry: LimiterOverride = serde_yaml::from_str(yaml).unwrap();
        let config = entry.apply_to(LimiterConfig::default());
        assert_eq!(config.refill, RefillKind::Window);
        assert_eq!(config.window_ms, 60_000);
    }

    #[test]
    fn test_override_keeps_unset_fields() {
        let base = LimiterConfig::continuous(3.0, 0.2).with_delay(2413, 6897);
        let entry: LimiterOverride = serde_yaml::from_str("capacity: 1").unwrap();
        let config = entry.apply_to(base);

        assert_eq!(config.capacity, 1.0);
        assert_eq!(config.refill_rate, 0.2);
        assert_eq!(config.min_delay_ms, 2413);
        assert_eq!(config.max_delay_ms, 6897);
    }

    #[test]
    fn test_override_rejects_unknown_keys() {
        // snake_case typo of refill-rate
        let result: Result<LimiterOverride, _> = serde_yaml::from_str("refill_rate: 0.5");
        assert!(result.is_err());
    }
}
