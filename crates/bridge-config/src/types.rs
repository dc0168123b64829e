//! Configuration file types.

use bridge_registry::{ChainRegistry, RegistryError};
use bridge_types::{ChainEntry, ChainFamily, Network};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}

fn default_amount() -> String {
	"0.01".to_string()
}

fn default_attestation_timeout_ms() -> u64 {
	60_000
}

fn default_event_capacity() -> usize {
	1000
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_true() -> bool {
	true
}

fn default_storage_backend() -> String {
	"memory".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub bridge: BridgeConfig,
	#[serde(default)]
	pub registry: RegistryConfig,
	/// Wallet backend per chain family.
	#[serde(default)]
	pub wallets: HashMap<ChainFamily, WalletConfig>,
	pub platform: PlatformConfig,
	#[serde(default)]
	pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
	pub network: Network,
	/// Decimal amount transferred when the caller gives none.
	#[serde(default = "default_amount")]
	pub amount: String,
	#[serde(default = "default_attestation_timeout_ms")]
	pub attestation_timeout_ms: u64,
	#[serde(default = "default_event_capacity")]
	pub event_capacity: usize,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

impl BridgeConfig {
	pub fn attestation_timeout(&self) -> Duration {
		Duration::from_millis(self.attestation_timeout_ms)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
	/// Start from the built-in chain table.
	#[serde(default = "default_true")]
	pub use_defaults: bool,
	/// Extra entries; with defaults enabled they replace matching built-ins.
	#[serde(default)]
	pub chains: Vec<ChainEntry>,
}

impl Default for RegistryConfig {
	fn default() -> Self {
		Self {
			use_defaults: true,
			chains: Vec::new(),
		}
	}
}

impl RegistryConfig {
	pub fn build(&self) -> Result<ChainRegistry, RegistryError> {
		if self.use_defaults {
			ChainRegistry::with_overrides(self.chains.clone())
		} else {
			ChainRegistry::from_entries(self.chains.clone())
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
	pub backend: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
	pub implementation: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
	#[serde(default = "default_storage_backend")]
	pub backend: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: default_storage_backend(),
			config: empty_table(),
		}
	}
}
