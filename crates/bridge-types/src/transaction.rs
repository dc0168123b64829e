//! Unsigned transactions produced by a chain platform and consumed by signers.
//!
//! The orchestrator never looks inside a payload; each signer variant accepts only
//! the payload of its own chain family.

use crate::chains::{Chain, ChainFamily};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a submitted transaction (hash or signature, family specific).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub String);

impl TxId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TxId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// EVM call request before wallet encoding.
///
/// Numeric fields are kept as integers here; the EVM signer converts them
/// into the hex quantities wallets expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransaction {
	pub to: String,
	#[serde(with = "hex::serde")]
	pub data: Vec<u8>,
	pub value: U256,
	pub chain_id: u64,
	#[serde(default)]
	pub gas_limit: Option<u64>,
}

/// Serialized Solana transaction awaiting a wallet signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaTransaction {
	#[serde(with = "hex::serde")]
	pub message: Vec<u8>,
}

/// Family specific transaction body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum TransactionPayload {
	Evm(EvmTransaction),
	Solana(SolanaTransaction),
}

impl TransactionPayload {
	pub fn family(&self) -> ChainFamily {
		match self {
			TransactionPayload::Evm(_) => ChainFamily::Evm,
			TransactionPayload::Solana(_) => ChainFamily::Solana,
		}
	}
}

/// Transaction to be signed and broadcast by a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
	pub chain: Chain,
	/// Human readable description shown in logs and wallet prompts.
	pub description: String,
	pub payload: TransactionPayload,
}

impl UnsignedTransaction {
	pub fn new(chain: Chain, description: impl Into<String>, payload: TransactionPayload) -> Self {
		Self {
			chain,
			description: description.into(),
			payload,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_payload_bytes_serialize_as_hex() {
		let tx = UnsignedTransaction::new(
			Chain::new("Sepolia"),
			"approve",
			TransactionPayload::Evm(EvmTransaction {
				to: "0x0000000000000000000000000000000000000001".into(),
				data: vec![0x09, 0x5e, 0xa7, 0xb3],
				value: U256::ZERO,
				chain_id: 11155111,
				gas_limit: None,
			}),
		);

		let json = serde_json::to_value(&tx).unwrap();
		assert_eq!(json["payload"]["family"], "evm");
		assert_eq!(json["payload"]["data"], "095ea7b3");
		assert_eq!(serde_json::from_value::<UnsignedTransaction>(json).unwrap(), tx);
	}
}
