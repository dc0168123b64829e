//! Registry mapping chain-family native ids to `(Network, Chain)` and back.
//!
//! The registry is built once at process start from the default table and/or
//! configuration, and is read-only afterwards. Share it behind an `Arc`.

use bridge_types::{Chain, ChainEntry, ChainFamily, NativeChainId, Network};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

mod defaults;

pub use defaults::default_entries;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
	#[error("Unknown chain id: {0}")]
	UnknownChainId(NativeChainId),
	#[error("No native chain id mapped for {chain} on {network}")]
	UnmappedChain { network: Network, chain: Chain },
	#[error("Duplicate registry entry: {0}")]
	Duplicate(String),
}

/// Bidirectional, immutable chain lookup table.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
	by_native: HashMap<NativeChainId, usize>,
	by_chain: HashMap<(Network, Chain), usize>,
	entries: Vec<ChainEntry>,
}

impl ChainRegistry {
	/// Builds a registry from a list of entries.
	///
	/// Every native id and every `(network, chain)` pair must appear once.
	pub fn from_entries(entries: impl IntoIterator<Item = ChainEntry>) -> Result<Self, RegistryError> {
		let mut registry = Self::default();
		for entry in entries {
			registry.insert(entry)?;
		}
		debug!(entries = registry.entries.len(), "Chain registry loaded");
		Ok(registry)
	}

	/// Registry preloaded with the built-in mainnet, testnet and devnet chains.
	pub fn with_defaults() -> Self {
		let mut registry = Self::default();
		for entry in default_entries() {
			// Built-in table has no duplicates.
			let _ = registry.insert(entry);
		}
		registry
	}

	/// Builds the default table and then applies `overrides`.
	///
	/// An override replaces any default entry sharing its native id or its
	/// `(network, chain)` pair.
	pub fn with_overrides(overrides: Vec<ChainEntry>) -> Result<Self, RegistryError> {
		let mut entries: Vec<ChainEntry> = default_entries()
			.into_iter()
			.filter(|d| {
				!overrides.iter().any(|o| {
					o.native_id == d.native_id || (o.network == d.network && o.chain == d.chain)
				})
			})
			.collect();
		entries.extend(overrides);
		Self::from_entries(entries)
	}

	fn insert(&mut self, entry: ChainEntry) -> Result<(), RegistryError> {
		if self.by_native.contains_key(&entry.native_id) {
			return Err(RegistryError::Duplicate(entry.native_id.to_string()));
		}
		let key = (entry.network, entry.chain.clone());
		if self.by_chain.contains_key(&key) {
			return Err(RegistryError::Duplicate(format!(
				"{} on {}",
				entry.chain, entry.network
			)));
		}

		let index = self.entries.len();
		self.by_native.insert(entry.native_id.clone(), index);
		self.by_chain.insert(key, index);
		self.entries.push(entry);
		Ok(())
	}

	/// Resolves a wallet-reported chain id.
	pub fn resolve(&self, native: &NativeChainId) -> Result<(Network, Chain), RegistryError> {
		self.by_native
			.get(native)
			.map(|&i| (self.entries[i].network, self.entries[i].chain.clone()))
			.ok_or_else(|| RegistryError::UnknownChainId(native.clone()))
	}

	/// Returns the native id a wallet needs to switch to `chain` on `network`.
	pub fn native_id(&self, network: Network, chain: &Chain) -> Result<NativeChainId, RegistryError> {
		self.entry(network, chain)
			.map(|e| e.native_id.clone())
			.ok_or_else(|| RegistryError::UnmappedChain {
				network,
				chain: chain.clone(),
			})
	}

	pub fn entry(&self, network: Network, chain: &Chain) -> Option<&ChainEntry> {
		self.by_chain
			.get(&(network, chain.clone()))
			.map(|&i| &self.entries[i])
	}

	pub fn family(&self, network: Network, chain: &Chain) -> Option<ChainFamily> {
		self.entry(network, chain).map(|e| e.family())
	}

	pub fn bridge_chain_id(&self, network: Network, chain: &Chain) -> Option<u16> {
		self.entry(network, chain).and_then(|e| e.bridge_chain_id)
	}

	/// Entries of one network, in insertion order.
	pub fn chains(&self, network: Network) -> impl Iterator<Item = &ChainEntry> {
		self.entries.iter().filter(move |e| e.network == network)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
