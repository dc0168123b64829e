//! Configuration for the bridge service.
//!
//! A configuration file names the network, the wallet backend for each chain
//! family, the transfer platform and the snapshot storage. Files may be TOML,
//! JSON or YAML; `${VAR}` references are substituted from the environment
//! and `BRIDGE_*` variables override selected settings.

use thiserror::Error;

pub mod loader;
pub mod types;

pub use loader::{substitute_env_vars, ConfigLoader, Format, ENV_PREFIX};
pub use types::*;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Configuration file not found: {0}")]
	FileNotFound(String),
	#[error("Unsupported config format: {0}")]
	UnsupportedFormat(String),
	#[error("Parse error: {0}")]
	ParseError(String),
	#[error("Validation error: {0}")]
	ValidationError(String),
	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}
