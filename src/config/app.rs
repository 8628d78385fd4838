//! Application configuration structures.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, expand_env_vars};
use crate::exporter::{
    DEFAULT_DELAY, DEFAULT_FETCHING_TIMEOUT, DEFAULT_MAX_PARALLEL, DEFAULT_NAMESPACE,
    ExporterOptions,
};
use crate::query::{Macros, Overrides};
use crate::selector::Selection;

// =============================================================================
// Constants
// =============================================================================

/// Default HTTP port for the metrics endpoint.
pub const DEFAULT_PORT: u16 = 8000;

fn default_delay() -> Duration {
    DEFAULT_DELAY
}

fn default_fetching_timeout() -> Duration {
    DEFAULT_FETCHING_TIMEOUT
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8000).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// =============================================================================
// Exporter Configuration
// =============================================================================

/// Scrape loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Prefix of every exported metric (default: "googleads").
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Delay between iterations (default: "15m").
    #[serde(default = "default_delay", with = "humantime_serde")]
    pub delay: Duration,

    /// Number of iterations before exiting; unlimited when absent.
    #[serde(default)]
    pub iterations: Option<u64>,

    /// Concurrent report fetches (default: 4).
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Timeout of a single report fetch (default: "120s").
    #[serde(default = "default_fetching_timeout", with = "humantime_serde")]
    pub fetching_timeout: Duration,

    /// Expose metrics whose value is zero.
    #[serde(default)]
    pub expose_metrics_with_zero_values: bool,

    /// Accounts every collector is fetched for.
    #[serde(default)]
    pub accounts: Vec<String>,

    /// Add a `mapping` service collector when the selection has none (default: true).
    #[serde(default = "default_true")]
    pub service_collectors: bool,

    /// Drop collectors that repeat a lower-level collector's query (default: true).
    #[serde(default = "default_true")]
    pub deduplicate: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            delay: DEFAULT_DELAY,
            iterations: None,
            max_parallel: DEFAULT_MAX_PARALLEL,
            fetching_timeout: DEFAULT_FETCHING_TIMEOUT,
            expose_metrics_with_zero_values: false,
            accounts: Vec::new(),
            service_collectors: true,
            deduplicate: true,
        }
    }
}

// =============================================================================
// Collectors Configuration
// =============================================================================

/// Which collectors run and where extra definitions live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorsConfig {
    /// Comma separated collector and registry names; `default` when absent.
    #[serde(default)]
    pub selection: Option<String>,

    /// Definition file or directory loaded after the bundled catalog.
    #[serde(default)]
    pub definitions: Option<PathBuf>,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Scrape loop configuration.
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Collector selection and extra definitions.
    #[serde(default)]
    pub collectors: CollectorsConfig,

    /// Macro values substituted into queries.
    #[serde(default)]
    pub macros: BTreeMap<String, String>,

    /// Per-collector overrides: collector name to field to value.
    #[serde(default)]
    pub overrides: BTreeMap<String, BTreeMap<String, String>>,
}

fn namespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("failed to compile namespace regex")
    })
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Self = if expanded.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.exporter.namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "exporter namespace cannot be empty".to_string(),
            ));
        }

        if !namespace_regex().is_match(self.exporter.namespace.trim()) {
            return Err(ConfigError::ValidationError(format!(
                "invalid exporter namespace: '{}'",
                self.exporter.namespace
            )));
        }

        if self.exporter.max_parallel == 0 {
            return Err(ConfigError::ValidationError(
                "exporter max_parallel must be positive".to_string(),
            ));
        }

        if self.exporter.fetching_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "exporter fetching_timeout must be positive".to_string(),
            ));
        }

        if self.exporter.iterations == Some(0) {
            return Err(ConfigError::ValidationError(
                "exporter iterations must be positive when set".to_string(),
            ));
        }

        self.collector_overrides()?;
        Ok(())
    }

    /// Server socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Collector selection; empty when not configured.
    pub fn selection(&self) -> Selection {
        self.collectors
            .selection
            .as_deref()
            .map(Selection::parse)
            .unwrap_or_default()
    }

    pub fn macros(&self) -> Macros {
        self.macros.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    /// Overrides keyed by collector name.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for unknown override fields.
    pub fn collector_overrides(&self) -> Result<HashMap<String, Overrides>, ConfigError> {
        self.overrides
            .iter()
            .map(|(collector, fields)| {
                Overrides::from_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                    .map(|overrides| (collector.clone(), overrides))
                    .map_err(|e| {
                        ConfigError::ValidationError(format!("overrides of '{collector}': {e}"))
                    })
            })
            .collect()
    }

    /// Scrape loop options.
    pub fn exporter_options(&self) -> ExporterOptions {
        ExporterOptions {
            namespace: self.exporter.namespace.trim().to_string(),
            delay: self.exporter.delay,
            iterations: self.exporter.iterations,
            max_parallel: self.exporter.max_parallel,
            fetching_timeout: self.exporter.fetching_timeout,
            expose_zero_values: self.exporter.expose_metrics_with_zero_values,
            accounts: self.exporter.accounts.clone(),
            service_collectors: self.exporter.service_collectors,
            deduplicate: self.exporter.deduplicate,
        }
    }
}
