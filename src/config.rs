//! Configuration module for the exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Scrape loop settings (namespace, delay, parallelism, accounts)
//! - Collector selection and extra definition files
//! - Macros and per-collector overrides

mod app;
mod validation;

pub use app::{AppConfig, CollectorsConfig, DEFAULT_PORT, ExporterConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration, parse_key_value};
