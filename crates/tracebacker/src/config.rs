//! Instrumentation configuration.
//!
//! # Example
//! ```rust,ignore
//! use tracebacker::InstrumentationConfig;
//!
//! // From environment
//! let config = InstrumentationConfig::from_env()?;
//!
//! // Or explicit configuration
//! let config = InstrumentationConfig::new()
//!     .tracing(true)
//!     .max_samples(500)
//!     .sample_function("decode_frame");
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracebacker_common::{Result, TracebackerError};

use crate::stats::{DEFAULT_MAX_SAMPLES, DEFAULT_WINDOW_SIZE};

/// Environment variable names read by [`InstrumentationConfig::from_env`]
pub mod env {
    pub const STATS_ENABLED: &str = "TRACEBACKER_STATS_ENABLED";
    pub const TRACING: &str = "TRACEBACKER_TRACING";
    pub const MAX_SAMPLES: &str = "TRACEBACKER_MAX_SAMPLES";
    pub const WINDOW_SIZE: &str = "TRACEBACKER_WINDOW_SIZE";
    pub const SAMPLED: &str = "TRACEBACKER_SAMPLED";
}

/// Settings for one instrumentation domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Whether the stats table starts enabled
    pub stats_enabled: bool,
    /// Whether the trace log starts active
    pub tracing: bool,
    /// Sample capacity for names that enable sampling without one
    pub max_samples: usize,
    /// Moving-average window used by the domain helpers
    pub window_size: usize,
    /// Names that retain samples from the start
    pub sampled_functions: Vec<String>,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            stats_enabled: true,
            tracing: false,
            max_samples: DEFAULT_MAX_SAMPLES,
            window_size: DEFAULT_WINDOW_SIZE,
            sampled_functions: Vec::new(),
        }
    }
}

impl InstrumentationConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether stats recording starts enabled
    pub fn stats_enabled(mut self, enabled: bool) -> Self {
        self.stats_enabled = enabled;
        self
    }

    /// Set whether tracing starts active
    pub fn tracing(mut self, active: bool) -> Self {
        self.tracing = active;
        self
    }

    /// Set the default sample capacity
    pub fn max_samples(mut self, max: usize) -> Self {
        self.max_samples = max;
        self
    }

    /// Set the moving-average window
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Sample `name` from the start
    pub fn sample_function(mut self, name: impl Into<String>) -> Self {
        self.sampled_functions.push(name.into());
        self
    }

    /// Load configuration from `TRACEBACKER_*` environment variables.
    ///
    /// Unset variables keep their defaults:
    /// - `TRACEBACKER_STATS_ENABLED` / `TRACEBACKER_TRACING`: `1|true|yes|on`
    ///   or `0|false|no|off`
    /// - `TRACEBACKER_MAX_SAMPLES` / `TRACEBACKER_WINDOW_SIZE`: integers
    /// - `TRACEBACKER_SAMPLED`: comma-separated function names
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(env::STATS_ENABLED) {
            config.stats_enabled = parse_bool(env::STATS_ENABLED, &value)?;
        }
        if let Some(value) = lookup(env::TRACING) {
            config.tracing = parse_bool(env::TRACING, &value)?;
        }
        if let Some(value) = lookup(env::MAX_SAMPLES) {
            config.max_samples = parse_number(env::MAX_SAMPLES, &value)?;
        }
        if let Some(value) = lookup(env::WINDOW_SIZE) {
            config.window_size = parse_number(env::WINDOW_SIZE, &value)?;
        }
        if let Some(value) = lookup(env::SAMPLED) {
            config.sampled_functions = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce meaningful output.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(TracebackerError::Configuration(
                "window_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(TracebackerError::Configuration(format!(
            "{}: expected a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        TracebackerError::Configuration(format!(
            "{}: expected a non-negative integer, got '{}'",
            key, value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = InstrumentationConfig::default();
        assert!(config.stats_enabled);
        assert!(!config.tracing);
        assert_eq!(config.max_samples, 100);
        assert_eq!(config.window_size, 5);
        assert!(config.sampled_functions.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = InstrumentationConfig::new()
            .stats_enabled(false)
            .tracing(true)
            .max_samples(10)
            .window_size(3)
            .sample_function("a")
            .sample_function("b");

        assert!(!config.stats_enabled);
        assert!(config.tracing);
        assert_eq!(config.max_samples, 10);
        assert_eq!(config.window_size, 3);
        assert_eq!(config.sampled_functions, vec!["a", "b"]);
    }

    #[test]
    fn test_from_lookup() {
        let config = InstrumentationConfig::from_lookup(lookup_from(&[
            (env::STATS_ENABLED, "off"),
            (env::TRACING, "TRUE"),
            (env::MAX_SAMPLES, " 250 "),
            (env::SAMPLED, "decode, encode,,mix "),
        ]))
        .unwrap();

        assert!(!config.stats_enabled);
        assert!(config.tracing);
        assert_eq!(config.max_samples, 250);
        assert_eq!(config.window_size, DEFAULT_WINDOW_SIZE);
        assert_eq!(config.sampled_functions, vec!["decode", "encode", "mix"]);
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let config = InstrumentationConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, InstrumentationConfig::default());
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = InstrumentationConfig::from_lookup(lookup_from(&[(env::TRACING, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, TracebackerError::Configuration(_)));
        assert!(err.to_string().contains("TRACEBACKER_TRACING"));

        let err = InstrumentationConfig::from_lookup(lookup_from(&[(env::MAX_SAMPLES, "-1")]))
            .unwrap_err();
        assert!(matches!(err, TracebackerError::Configuration(_)));

        let err = InstrumentationConfig::from_lookup(lookup_from(&[(env::WINDOW_SIZE, "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("window_size"));
    }

    #[test]
    fn test_from_json() {
        let config =
            InstrumentationConfig::from_json(r#"{"tracing": true, "sampled_functions": ["x"]}"#)
                .unwrap();
        assert!(config.tracing);
        assert!(config.stats_enabled);
        assert_eq!(config.max_samples, DEFAULT_MAX_SAMPLES);
        assert_eq!(config.sampled_functions, vec!["x"]);

        let err = InstrumentationConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, TracebackerError::Serialization(_)));
    }
}
