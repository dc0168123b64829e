//! Chain and network identity types.
//!
//! A [`Network`] is the deployment environment every wallet, registry entry and
//! transfer must agree on. A [`Chain`] is an abstract chain identity that is
//! unique within a network, and a [`NativeChainId`] is the identifier a wallet of
//! the chain's family reports for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing identity types from strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityParseError {
	#[error("Unknown network: {0}")]
	UnknownNetwork(String),
	#[error("Unknown chain family: {0}")]
	UnknownFamily(String),
	#[error("Invalid chain address: {0}")]
	InvalidChainAddress(String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
	Mainnet,
	Testnet,
	Devnet,
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Network::Mainnet => "Mainnet",
			Network::Testnet => "Testnet",
			Network::Devnet => "Devnet",
		};
		f.write_str(name)
	}
}

impl FromStr for Network {
	type Err = IdentityParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"mainnet" => Ok(Network::Mainnet),
			"testnet" => Ok(Network::Testnet),
			"devnet" => Ok(Network::Devnet),
			_ => Err(IdentityParseError::UnknownNetwork(s.to_string())),
		}
	}
}

/// Family of chains sharing one wallet protocol and transaction format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
	Evm,
	Solana,
}

impl fmt::Display for ChainFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChainFamily::Evm => f.write_str("evm"),
			ChainFamily::Solana => f.write_str("solana"),
		}
	}
}

impl FromStr for ChainFamily {
	type Err = IdentityParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"evm" => Ok(ChainFamily::Evm),
			"solana" => Ok(ChainFamily::Solana),
			_ => Err(IdentityParseError::UnknownFamily(s.to_string())),
		}
	}
}

/// Abstract chain identity, e.g. `Sepolia` or `Solana`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain(String);

impl Chain {
	pub fn new(name: impl Into<String>) -> Self {
		Self(name.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Chain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Chain {
	fn from(name: &str) -> Self {
		Self::new(name)
	}
}

/// Identifier a wallet reports for its active chain.
///
/// EVM wallets report an EIP-155 chain id, Solana wallets report a cluster name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", content = "id", rename_all = "lowercase")]
pub enum NativeChainId {
	Evm(u64),
	Solana(String),
}

impl NativeChainId {
	pub fn family(&self) -> ChainFamily {
		match self {
			NativeChainId::Evm(_) => ChainFamily::Evm,
			NativeChainId::Solana(_) => ChainFamily::Solana,
		}
	}

	/// Returns the EIP-155 chain id if this is an EVM identifier.
	pub fn as_evm(&self) -> Option<u64> {
		match self {
			NativeChainId::Evm(id) => Some(*id),
			NativeChainId::Solana(_) => None,
		}
	}
}

impl fmt::Display for NativeChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NativeChainId::Evm(id) => write!(f, "eip155:{}", id),
			NativeChainId::Solana(cluster) => write!(f, "solana:{}", cluster),
		}
	}
}

/// An account on a specific chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainAddress {
	pub chain: Chain,
	pub address: String,
}

impl ChainAddress {
	pub fn new(chain: Chain, address: impl Into<String>) -> Self {
		Self {
			chain,
			address: address.into(),
		}
	}
}

impl fmt::Display for ChainAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.chain, self.address)
	}
}

impl FromStr for ChainAddress {
	type Err = IdentityParseError;

	/// Parses `<chain>:<address>`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (chain, address) = s
			.split_once(':')
			.ok_or_else(|| IdentityParseError::InvalidChainAddress(s.to_string()))?;
		if chain.is_empty() || address.is_empty() {
			return Err(IdentityParseError::InvalidChainAddress(s.to_string()));
		}
		Ok(Self::new(Chain::new(chain), address))
	}
}

/// One row of the chain/network registry table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
	pub network: Network,
	pub chain: Chain,
	pub native_id: NativeChainId,
	/// Numeric chain id used by the bridge protocol, when the chain is bridged.
	#[serde(default)]
	pub bridge_chain_id: Option<u16>,
}

impl ChainEntry {
	pub fn new(network: Network, chain: &str, native_id: NativeChainId) -> Self {
		Self {
			network,
			chain: Chain::new(chain),
			native_id,
			bridge_chain_id: None,
		}
	}

	pub fn with_bridge_chain_id(mut self, id: u16) -> Self {
		self.bridge_chain_id = Some(id);
		self
	}

	pub fn family(&self) -> ChainFamily {
		self.native_id.family()
	}
}
