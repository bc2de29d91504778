//! Configuration module for the event processor
//!
//! This module handles processor configuration including:
//! - Sandbox ceilings applied to every script invocation
//! - Metadata and compiled-script cache sizing
//! - Logging setup for the command-line front end
//!
//! # Config Location
//!
//! When no path is given, the configuration is read from the
//! platform-appropriate config directory under `event-processor`:
//!
//! - **Linux**: `~/.config/event-processor/processor.toml`
//! - **macOS**: `~/Library/Application Support/event-processor/processor.toml`
//! - **Windows**: `%APPDATA%\event-processor\processor.toml`
//!
//! # Example
//!
//! ```toml
//! [sandbox]
//! max_operations = 500000
//! execution_timeout_ms = 2000
//!
//! [cache]
//! metadata_ttl_secs = 60
//!
//! [logging]
//! filter = "info,event_processor=debug"
//! ```

pub mod catalog;

pub use catalog::Catalog;

use crate::error::{ProcessorError, Result};
use crate::scripting::SandboxLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for config directories
pub const APP_ID: &str = "event-processor";

/// Config filename
pub const CONFIG_FILE: &str = "processor.toml";

/// Default capacity of the compiled script cache
pub const DEFAULT_SCRIPT_CACHE_CAPACITY: usize = 256;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info,event_processor=debug";

/// Get the default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Complete processor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub sandbox: SandboxSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

/// Ceilings enforced on user scripts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Maximum number of engine operations per invocation (0 = unlimited)
    pub max_operations: u64,
    /// Maximum script function call depth
    pub max_call_levels: usize,
    /// Maximum expression nesting depth
    pub max_expr_depth: usize,
    /// Maximum string length in bytes (0 = unlimited)
    pub max_string_size: usize,
    /// Maximum array length
    pub max_array_size: usize,
    /// Maximum object map size
    pub max_map_size: usize,
    /// Wall-clock ceiling for one step or hook invocation (0 = unlimited)
    pub execution_timeout_ms: u64,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        let limits = SandboxLimits::default();
        Self {
            max_operations: limits.max_operations,
            max_call_levels: limits.max_call_levels,
            max_expr_depth: limits.max_expr_depth,
            max_string_size: limits.max_string_size,
            max_array_size: limits.max_array_size,
            max_map_size: limits.max_map_size,
            execution_timeout_ms: limits
                .execution_timeout
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        }
    }
}

impl SandboxSettings {
    /// Convert into the limits the sandbox consumes
    pub fn limits(&self) -> SandboxLimits {
        SandboxLimits {
            max_operations: self.max_operations,
            max_call_levels: self.max_call_levels,
            max_expr_depth: self.max_expr_depth,
            max_string_size: self.max_string_size,
            max_array_size: self.max_array_size,
            max_map_size: self.max_map_size,
            execution_timeout: (self.execution_timeout_ms > 0)
                .then(|| Duration::from_millis(self.execution_timeout_ms)),
        }
    }
}

/// Cache sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Lifetime of cached metadata records; `None` keeps them until invalidated
    pub metadata_ttl_secs: Option<u64>,
    /// Number of compiled scripts kept across batches
    pub script_cache_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            metadata_ttl_secs: None,
            script_cache_capacity: DEFAULT_SCRIPT_CACHE_CAPACITY,
        }
    }
}

impl CacheSettings {
    pub fn metadata_ttl(&self) -> Option<Duration> {
        self.metadata_ttl_secs.map(Duration::from_secs)
    }
}

/// Logging setup for the binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,
    /// Directory for daily-rotated log files; stderr only when absent
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            directory: None,
        }
    }
}

impl ProcessorConfig {
    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProcessorError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ProcessorError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load the config at `path`, or the default location, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) if p.exists() => p,
                _ => return Self::default(),
            },
        };

        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to disk as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProcessorError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ProcessorError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            ProcessorError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
