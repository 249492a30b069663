//! Pipeline configuration
//!
//! ```toml
//! [executive]
//! parallel_execution = true
//! trace = true
//! trace_capacity = 4096
//!
//! [logging]
//! filter = "vizflow=debug"
//! json = false
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Executive behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutiveConfig {
    /// Run independent stages of one topological level concurrently
    pub parallel_execution: bool,
    /// Record pass events
    pub trace: bool,
    /// Events retained by the pass trace
    pub trace_capacity: usize,
}

impl Default for ExecutiveConfig {
    fn default() -> Self {
        Self {
            parallel_execution: false,
            trace: true,
            trace_capacity: 4096,
        }
    }
}

/// Log output settings, consumed by the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive; `RUST_LOG` wins when set
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `[executive]` section
    pub executive: ExecutiveConfig,
    /// `[logging]` section
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Parse from TOML text
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on malformed TOML, [`ConfigError::Invalid`] on
    /// out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`PipelineConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.executive.trace && self.executive.trace_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "executive.trace_capacity",
                reason: "must be positive when tracing is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Set parallel execution
    #[inline]
    #[must_use]
    pub fn with_parallel_execution(mut self, enabled: bool) -> Self {
        self.executive.parallel_execution = enabled;
        self
    }

    /// Enable or disable the pass trace
    #[inline]
    #[must_use]
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.executive.trace = enabled;
        self
    }

    /// Set the pass trace capacity
    #[inline]
    #[must_use]
    pub fn with_trace_capacity(mut self, capacity: usize) -> Self {
        self.executive.trace_capacity = capacity;
        self
    }

    /// Set the log filter
    #[inline]
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.logging.filter = filter.into();
        self
    }
}
