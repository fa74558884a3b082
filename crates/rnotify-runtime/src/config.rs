#![forbid(unsafe_code)]

//! Runtime tunables.
//!
//! [`NotifierConfig`] is plain data with builder-style setters. With the
//! `config-file` feature it can also be parsed from TOML:
//!
//! ```toml
//! dispose_delay_ms = 30000
//! overflow_window_ms = 500
//! overflow_threshold = 50
//! load_on_init = true
//! load_timeout_ms = 10000
//! ```
//!
//! Missing fields keep their defaults.

use web_time::Duration;

/// Default delay between the last reference going away and teardown.
pub const DEFAULT_DISPOSE_DELAY: Duration = Duration::from_secs(30);
/// Default sliding window for overflow accounting.
pub const DEFAULT_OVERFLOW_WINDOW: Duration = Duration::from_millis(500);
/// Default number of notifications tolerated inside one window.
pub const DEFAULT_OVERFLOW_THRESHOLD: u32 = 50;

/// Registry-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Delay before an unreferenced auto-dispose container is torn down.
    pub dispose_delay: Duration,
    /// Length of the notification-overflow window.
    pub overflow_window: Duration,
    /// Notifications tolerated per window before a warning is logged.
    pub overflow_threshold: u32,
    /// Whether async view-models start loading as soon as they are created.
    pub load_on_init: bool,
    /// Deadline for each async load. A load that outlives it ends in
    /// `AsyncState::Error`. `None` disables the deadline.
    pub load_timeout: Option<Duration>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            dispose_delay: DEFAULT_DISPOSE_DELAY,
            overflow_window: DEFAULT_OVERFLOW_WINDOW,
            overflow_threshold: DEFAULT_OVERFLOW_THRESHOLD,
            load_on_init: true,
            load_timeout: None,
        }
    }
}

impl NotifierConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dispose_delay(mut self, delay: Duration) -> Self {
        self.dispose_delay = delay;
        self
    }

    #[must_use]
    pub fn with_overflow_window(mut self, window: Duration) -> Self {
        self.overflow_window = window;
        self
    }

    #[must_use]
    pub fn with_overflow_threshold(mut self, threshold: u32) -> Self {
        self.overflow_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_load_on_init(mut self, load: bool) -> Self {
        self.load_on_init = load;
        self
    }

    #[must_use]
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Reject configurations that would make overflow accounting useless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overflow_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "overflow_threshold",
                reason: "must be at least 1",
            });
        }
        if self.overflow_window.is_zero() {
            return Err(ConfigError::Invalid {
                field: "overflow_window",
                reason: "must be non-zero",
            });
        }
        if self.load_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConfigError::Invalid {
                field: "load_timeout",
                reason: "must be non-zero",
            });
        }
        Ok(())
    }
}

/// Configuration loading/validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },

    #[cfg(feature = "config-file")]
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "config-file")]
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "config-file")]
mod file {
    use super::{ConfigError, NotifierConfig};
    use serde::Deserialize;
    use std::path::Path;
    use web_time::Duration;

    #[derive(Debug, Default, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct RawConfig {
        dispose_delay_ms: Option<u64>,
        overflow_window_ms: Option<u64>,
        overflow_threshold: Option<u32>,
        load_on_init: Option<bool>,
        load_timeout_ms: Option<u64>,
    }

    impl NotifierConfig {
        /// Parse a TOML document. Missing keys keep their defaults.
        pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
            let raw: RawConfig = toml::from_str(text)?;
            let mut config = Self::default();
            if let Some(ms) = raw.dispose_delay_ms {
                config.dispose_delay = Duration::from_millis(ms);
            }
            if let Some(ms) = raw.overflow_window_ms {
                config.overflow_window = Duration::from_millis(ms);
            }
            if let Some(threshold) = raw.overflow_threshold {
                config.overflow_threshold = threshold;
            }
            if let Some(load) = raw.load_on_init {
                config.load_on_init = load;
            }
            if let Some(ms) = raw.load_timeout_ms {
                config.load_timeout = Some(Duration::from_millis(ms));
            }
            config.validate()?;
            Ok(config)
        }

        /// Read and parse a TOML file.
        pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
            let text = std::fs::read_to_string(path)?;
            Self::from_toml_str(&text)
        }
    }
}
