//! Token transfer aggregate and its lifecycle state.

use crate::amount::Amount;
use crate::chains::{Chain, ChainAddress};
use crate::transaction::TxId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Location of a token on its chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "lowercase")]
pub enum TokenAddress {
	/// The chain's native gas token.
	Native,
	/// A token contract.
	Contract(String),
}

impl TokenAddress {
	pub fn is_native(&self) -> bool {
		matches!(self, TokenAddress::Native)
	}
}

impl fmt::Display for TokenAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TokenAddress::Native => f.write_str("Native"),
			TokenAddress::Contract(address) => f.write_str(address),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId {
	pub chain: Chain,
	pub address: TokenAddress,
}

impl TokenId {
	pub fn native(chain: Chain) -> Self {
		Self {
			chain,
			address: TokenAddress::Native,
		}
	}

	pub fn contract(chain: Chain, address: impl Into<String>) -> Self {
		Self {
			chain,
			address: TokenAddress::Contract(address.into()),
		}
	}
}

/// What is being moved, from where, to where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDetails {
	pub from: ChainAddress,
	pub to: ChainAddress,
	pub token: TokenId,
	pub amount: Amount,
	/// Whether a relayer completes the transfer on the destination chain.
	#[serde(default)]
	pub automatic: bool,
}

/// Identifier of a message attested by the bridge's guardian network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttestationId {
	/// Chain the message was emitted on.
	pub chain: Chain,
	/// Bridge protocol id of the emitter chain, if known.
	#[serde(default)]
	pub bridge_chain_id: Option<u16>,
	/// 32-byte emitter address, hex encoded.
	pub emitter: String,
	pub sequence: u64,
}

impl fmt::Display for AttestationId {
	/// Renders as `<chain id>/<emitter hex>/<sequence>`.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let emitter = self.emitter.strip_prefix("0x").unwrap_or(&self.emitter);
		match self.bridge_chain_id {
			Some(id) => write!(f, "{}/{}/{}", id, emitter, self.sequence),
			None => write!(f, "{}/{}/{}", self.chain, emitter, self.sequence),
		}
	}
}

/// A transfer in progress.
///
/// Created once per user initiated transfer and mutated only by the
/// orchestrator's phase operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
	pub id: String,
	pub details: TransferDetails,
	#[serde(default)]
	pub source_txids: Vec<TxId>,
	#[serde(default)]
	pub attestations: Vec<AttestationId>,
	#[serde(default)]
	pub destination_txids: Vec<TxId>,
}

impl TokenTransfer {
	pub fn new(details: TransferDetails) -> Self {
		Self {
			id: uuid::Uuid::new_v4().to_string(),
			details,
			source_txids: Vec::new(),
			attestations: Vec::new(),
			destination_txids: Vec::new(),
		}
	}
}

/// Lifecycle of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferState {
	Idle,
	Built,
	Initiated,
	AttestationPending,
	Attested,
	Completed,
	Failed,
}

impl TransferState {
	pub fn is_terminal(&self) -> bool {
		matches!(self, TransferState::Completed | TransferState::Failed)
	}
}

impl fmt::Display for TransferState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

/// Read-only view of a transfer handed to the presentation layer and to storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSnapshot {
	pub state: TransferState,
	pub transfer: Option<TokenTransfer>,
	/// Display text of the last failed phase, cleared on the next success.
	#[serde(default)]
	pub last_error: Option<String>,
	/// Source transactions the wallet accepted in initiation attempts that
	/// were rejected part way. They are on chain even though the transfer
	/// stayed `Built`.
	#[serde(default)]
	pub submitted_txids: Vec<TxId>,
	pub updated_at: DateTime<Utc>,
}

impl TransferSnapshot {
	pub fn idle() -> Self {
		Self {
			state: TransferState::Idle,
			transfer: None,
			last_error: None,
			submitted_txids: Vec::new(),
			updated_at: Utc::now(),
		}
	}

	pub fn transfer_id(&self) -> Option<&str> {
		self.transfer.as_ref().map(|t| t.id.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::U256;

	fn details() -> TransferDetails {
		TransferDetails {
			from: ChainAddress::new(Chain::new("Avalanche"), "0x01"),
			to: ChainAddress::new(Chain::new("Sepolia"), "0x01"),
			token: TokenId::native(Chain::new("Avalanche")),
			amount: Amount::from_units(U256::from(10u64), 18),
			automatic: false,
		}
	}

	#[test]
	fn test_attestation_display_strips_prefix() {
		let att = AttestationId {
			chain: Chain::new("Avalanche"),
			bridge_chain_id: Some(6),
			emitter: "0x00000000000000000000000061e44e506ca5659e6c0bba9b678586fa2d729756"
				.to_string(),
			sequence: 42,
		};
		assert_eq!(
			att.to_string(),
			"6/00000000000000000000000061e44e506ca5659e6c0bba9b678586fa2d729756/42"
		);

		let unnamed = AttestationId {
			bridge_chain_id: None,
			..att
		};
		assert!(unnamed.to_string().starts_with("Avalanche/"));
	}

	#[test]
	fn test_new_transfer_is_empty() {
		let a = TokenTransfer::new(details());
		let b = TokenTransfer::new(details());
		assert_ne!(a.id, b.id);
		assert!(a.source_txids.is_empty());
		assert!(a.attestations.is_empty());
		assert!(a.destination_txids.is_empty());
	}

	#[test]
	fn test_snapshot_json_roundtrip_keeps_state() {
		let snapshot = TransferSnapshot {
			state: TransferState::AttestationPending,
			transfer: Some(TokenTransfer::new(details())),
			last_error: Some("timed out".into()),
			submitted_txids: vec![TxId::new("0xapprove")],
			updated_at: Utc::now(),
		};
		let json = serde_json::to_string(&snapshot).unwrap();
		let back: TransferSnapshot = serde_json::from_str(&json).unwrap();
		assert_eq!(back, snapshot);
		assert!(!back.state.is_terminal());
		assert!(TransferState::Completed.is_terminal());
	}
}
