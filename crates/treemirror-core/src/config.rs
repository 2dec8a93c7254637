//! Configuration module for treemirror.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::manifest::ManifestOptions;
use crate::ports::Credentials;
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for treemirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: Vec<SourceConfig>,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// Which backend a source uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Object-tree API with flat, parent-indexed listings.
    ObjectTree,
    /// Hierarchical HTTP listing.
    Listing,
    /// Local or mounted directory (`file://`).
    Directory,
}

impl SourceKind {
    /// Manifest priority used when the source does not set one.
    pub fn default_priority(self) -> i32 {
        match self {
            Self::ObjectTree => 10,
            Self::Listing | Self::Directory => 1,
        }
    }
}

/// One remote update source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Endpoint URI; scheme and host are validated by the backend.
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// API host for object-tree sources; the backend default is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_host: Option<String>,
    /// Overrides the kind's default manifest priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl SourceConfig {
    pub fn new(kind: SourceKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            username: None,
            password: None,
            service_host: None,
            priority: None,
        }
    }

    /// Credentials, when a username is configured.
    pub fn credentials(&self) -> Option<Credentials> {
        self.username.as_ref().map(|user| {
            Credentials::new(user.clone(), self.password.clone().unwrap_or_default())
        })
    }

    /// Manifest parsing options for this source.
    pub fn manifest_options(&self) -> ManifestOptions {
        ManifestOptions::with_priority(self.priority.unwrap_or_else(|| self.kind.default_priority()))
    }
}

/// Retry settings for remote connect and listing calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub connect_attempts: u32,
    /// Fixed delay between attempts (milliseconds).
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.connect_attempts, Duration::from_millis(self.delay_ms))
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/treemirror/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("treemirror")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            connect_attempts: RetryPolicy::REMOTE.attempts,
            delay_ms: RetryPolicy::REMOTE.delay.as_millis() as u64,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retry.connect_attempts"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Endpoint scheme and
    /// host checks are left to the backends, which reject mismatches at
    /// construction time.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sources ---
        for (i, source) in self.sources.iter().enumerate() {
            if !source.endpoint.contains("://") {
                errors.push(ValidationError {
                    field: format!("sources[{i}].endpoint"),
                    message: format!("not a URI: '{}'", source.endpoint),
                });
            }
            if source.password.is_some() && source.username.is_none() {
                errors.push(ValidationError {
                    field: format!("sources[{i}].password"),
                    message: "password given without username".into(),
                });
            }
            if source.service_host.is_some() && source.kind != SourceKind::ObjectTree {
                errors.push(ValidationError {
                    field: format!("sources[{i}].service_host"),
                    message: "only object_tree sources use a service host".into(),
                });
            }
        }

        // --- retry ---
        if self.retry.connect_attempts == 0 {
            errors.push(ValidationError {
                field: "retry.connect_attempts".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// # Example
///
/// ```rust,no_run
/// use treemirror_core::config::{ConfigBuilder, SourceConfig, SourceKind};
///
/// let config = ConfigBuilder::new()
///     .source(SourceConfig::new(SourceKind::Listing, "https://mirror.example.org/updates"))
///     .retry_connect_attempts(3)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn source(mut self, source: SourceConfig) -> Self {
        self.config.sources.push(source);
        self
    }

    pub fn retry_connect_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.connect_attempts = attempts;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.delay_ms = ms;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
