use std::time::Duration;

/// Timing knobs for a guide session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Quiet period after the last edit before an automatic flush
    pub debounce: Duration,
    /// Minimum time between two acknowledged writes
    pub min_flush_interval: Duration,
    /// How long a transient save status stays visible before returning to idle
    pub status_reset: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            min_flush_interval: Duration::from_secs(2),
            status_reset: Duration::from_millis(2400),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Optional environment variables (milliseconds):
    /// - `GUIDE_DEBOUNCE_MS`
    /// - `GUIDE_MIN_FLUSH_INTERVAL_MS`
    /// - `GUIDE_STATUS_RESET_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let millis = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidMillis { name, value: raw }),
            }
        };

        Ok(Self {
            debounce: millis("GUIDE_DEBOUNCE_MS", defaults.debounce)?,
            min_flush_interval: millis("GUIDE_MIN_FLUSH_INTERVAL_MS", defaults.min_flush_interval)?,
            status_reset: millis("GUIDE_STATUS_RESET_MS", defaults.status_reset)?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a whole number of milliseconds, got {value:?}")]
    InvalidMillis { name: &'static str, value: String },
}
