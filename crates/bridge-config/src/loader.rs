//! Configuration loading from files and environment.

use crate::types::Config;
use crate::ConfigError;
use bridge_types::{Amount, Network};
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "BRIDGE_";

/// Upper bound on fractional digits accepted for the default amount.
const MAX_AMOUNT_DECIMALS: u8 = 36;

/// File formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
	Toml,
	Json,
	Yaml,
}

impl Format {
	pub fn from_path(path: &Path) -> Option<Self> {
		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Some(Format::Toml),
			Some("json") => Some(Format::Json),
			Some("yaml") | Some("yml") => Some(Format::Yaml),
			_ => None,
		}
	}
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
	/// Loads, substitutes, overrides and validates a configuration file.
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
		let path = path.as_ref();
		info!("Loading configuration from {:?}", path);

		if !path.exists() {
			return Err(ConfigError::FileNotFound(path.display().to_string()));
		}
		let format = Format::from_path(path)
			.ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
		let contents = std::fs::read_to_string(path)?;

		Self::load(&contents, format, |name| std::env::var(name).ok())
	}

	/// Same pipeline as [`ConfigLoader::from_file`] with an explicit variable lookup.
	pub fn load<F>(contents: &str, format: Format, lookup: F) -> Result<Config, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let contents = substitute_env_vars(contents, &lookup)?;
		let mut config = Self::parse(&contents, format)?;
		Self::apply_env_overrides(&mut config, &lookup)?;
		Self::validate_config(&config)?;
		Ok(config)
	}

	pub fn parse(contents: &str, format: Format) -> Result<Config, ConfigError> {
		match format {
			Format::Toml => toml::from_str(contents)
				.map_err(|e| ConfigError::ParseError(format!("Failed to parse TOML: {}", e))),
			Format::Json => serde_json::from_str(contents)
				.map_err(|e| ConfigError::ParseError(format!("Failed to parse JSON: {}", e))),
			Format::Yaml => serde_yaml::from_str(contents)
				.map_err(|e| ConfigError::ParseError(format!("Failed to parse YAML: {}", e))),
		}
	}

	/// Applies `BRIDGE_NETWORK`, `BRIDGE_AMOUNT`, `BRIDGE_ATTESTATION_TIMEOUT_MS`
	/// and `BRIDGE_LOG_LEVEL`.
	fn apply_env_overrides<F>(config: &mut Config, lookup: &F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

		if let Some(network) = var("NETWORK") {
			debug!(%network, "Overriding network from environment");
			config.bridge.network = network
				.parse::<Network>()
				.map_err(|e| ConfigError::ValidationError(e.to_string()))?;
		}
		if let Some(amount) = var("AMOUNT") {
			debug!(%amount, "Overriding amount from environment");
			config.bridge.amount = amount;
		}
		if let Some(timeout) = var("ATTESTATION_TIMEOUT_MS") {
			config.bridge.attestation_timeout_ms = timeout.parse().map_err(|_| {
				ConfigError::ValidationError(format!(
					"{}ATTESTATION_TIMEOUT_MS must be an integer, got {}",
					ENV_PREFIX, timeout
				))
			})?;
		}
		if let Some(level) = var("LOG_LEVEL") {
			config.bridge.log_level = level;
		}
		Ok(())
	}

	/// Validate configuration
	pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
		let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

		let amount = Amount::parse(&config.bridge.amount, MAX_AMOUNT_DECIMALS).map_err(|e| {
			ConfigError::ValidationError(format!("bridge.amount {}: {}", config.bridge.amount, e))
		})?;
		if amount.is_zero() {
			return invalid("bridge.amount must be greater than zero".into());
		}
		if config.bridge.attestation_timeout_ms == 0 {
			return invalid("bridge.attestation_timeout_ms must be greater than zero".into());
		}
		if config.bridge.event_capacity == 0 {
			return invalid("bridge.event_capacity must be greater than zero".into());
		}
		if config.wallets.is_empty() {
			return invalid("At least one wallet must be configured".into());
		}
		for (family, wallet) in &config.wallets {
			if wallet.backend.is_empty() {
				return invalid(format!("wallets.{}.backend must not be empty", family));
			}
		}
		if config.platform.implementation.is_empty() {
			return invalid("platform.implementation must not be empty".into());
		}

		let registry = config
			.registry
			.build()
			.map_err(|e| ConfigError::ValidationError(format!("registry: {}", e)))?;
		if registry.chains(config.bridge.network).next().is_none() {
			return invalid(format!(
				"No chains registered for network {}",
				config.bridge.network
			));
		}
		for family in config.wallets.keys() {
			if !registry
				.chains(config.bridge.network)
				.any(|entry| entry.family() == *family)
			{
				return invalid(format!(
					"Wallet configured for {} but no {} chain is registered on {}",
					family, family, config.bridge.network
				));
			}
		}

		Ok(())
	}
}

/// Replaces `${VAR}` references with values from `lookup`.
pub fn substitute_env_vars<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let re = Regex::new(r"\$\{([^}]+)\}")
		.map_err(|e| ConfigError::ParseError(format!("Invalid substitution pattern: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value =
			lookup(name.as_str()).ok_or_else(|| ConfigError::EnvVarNotFound(name.as_str().into()))?;
		result.push_str(&input[last..whole.start()]);
		result.push_str(&value);
		last = whole.end();
	}
	result.push_str(&input[last..]);
	Ok(result)
}
