//! Backend names accepted in configuration files.

use bridge_config::Config;
use bridge_core::BridgeBuilder;
use bridge_platform::implementations::{simulated, token_bridge};
use bridge_signer::implementations::{jsonrpc, memory};
use bridge_storage::implementations::{file, memory as memory_storage};

pub fn builder(config: Config) -> BridgeBuilder {
	BridgeBuilder::new(config)
		.with_wallet_factory("memory", memory::create_wallet)
		.with_wallet_factory("jsonrpc", jsonrpc::create_wallet)
		.with_platform_factory("simulated", simulated::create_platform)
		.with_platform_factory("token_bridge", token_bridge::create_platform)
		.with_storage_factory("memory", memory_storage::create_storage)
		.with_storage_factory("file", file::create_storage)
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_config::{ConfigLoader, Format};
	use bridge_types::ChainFamily;
	use std::path::PathBuf;

	fn load(name: &str) -> Config {
		let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
			.join("../../config")
			.join(name);
		let contents = std::fs::read_to_string(path).unwrap();
		ConfigLoader::load(&contents, Format::Toml, |var| match var {
			"SEPOLIA_RPC_URL" => Some("http://localhost:8545".into()),
			"FUJI_RPC_URL" => Some("http://localhost:9650/ext/bc/C/rpc".into()),
			_ => None,
		})
		.unwrap()
	}

	#[test]
	fn test_shipped_configs_build() {
		let engine = builder(load("bridge.toml")).build().unwrap();
		assert!(engine.session(ChainFamily::Evm).is_some());
		assert!(engine.session(ChainFamily::Solana).is_none());

		let engine = builder(load("dry-run.toml")).build().unwrap();
		assert!(engine.session(ChainFamily::Solana).is_some());
	}
}
