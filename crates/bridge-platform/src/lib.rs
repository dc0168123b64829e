//! Chain-platform capability for the bridge wallet.
//!
//! A platform knows each chain's configuration, turns transfer details into
//! the transactions of its bridge protocol, and watches the attestation
//! network for the messages those transactions emit. The orchestrator drives
//! it phase by phase and never looks at the transactions it produces.

use async_trait::async_trait;
use bridge_signer::{Signer, SignerError};
use bridge_types::{
	AttestationId, Chain, ChainFamily, ConfigSchema, Network, TokenAddress, TokenId,
	TokenTransfer, TransferDetails, TxId, ValidationError,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Re-export implementations
pub mod implementations {
	pub mod simulated;
	pub mod token_bridge;
}

/// Errors that can occur while talking to a chain platform.
#[derive(Debug, Error)]
pub enum PlatformError {
	/// The platform has no deployment on this chain for the configured network.
	#[error("Chain not supported by platform: {0}")]
	UnsupportedChain(Chain),
	/// Signing or submission failed in the wallet.
	#[error("Signer error: {0}")]
	Signer(#[from] SignerError),
	/// No attestation was observed before the deadline.
	#[error("No attestation within {0:?}")]
	AttestationTimeout(Duration),
	/// Completion was requested for a transfer without attestations.
	#[error("Transfer has no attestation to redeem")]
	MissingAttestation,
	/// The transfer cannot be processed in its current form.
	#[error("Invalid transfer: {0}")]
	InvalidTransfer(String),
	/// RPC node or attestation service failure.
	#[error("Network error: {0}")]
	Network(String),
	/// Invalid platform configuration.
	#[error("Configuration error: {0}")]
	Config(String),
}

impl From<ValidationError> for PlatformError {
	fn from(err: ValidationError) -> Self {
		PlatformError::Config(err.to_string())
	}
}

/// Platform view of one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainContext {
	pub chain: Chain,
	pub network: Network,
	pub family: ChainFamily,
	pub native_decimals: u8,
	/// Bridge protocol chain id, used as the recipient chain of transfers.
	pub bridge_chain_id: Option<u16>,
}

/// Trait defining the interface for chain platforms.
#[async_trait]
pub trait PlatformInterface: Send + Sync {
	/// Returns the configuration schema for this platform implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves the platform context for `chain`.
	fn chain_context(&self, chain: &Chain) -> Result<ChainContext, PlatformError>;

	/// Decimal precision of a token.
	async fn token_decimals(&self, token: &TokenId) -> Result<u8, PlatformError>;

	/// Number of attestations a transfer needs before it can be completed.
	fn required_attestations(&self, _transfer: &TokenTransfer) -> usize {
		1
	}

	/// Builds the source transactions and submits them through `signer`.
	async fn initiate_transfer(
		&self,
		transfer: &TokenTransfer,
		signer: &dyn Signer,
	) -> Result<Vec<TxId>, PlatformError>;

	/// Waits up to `timeout` for the attestations of the transfer's messages.
	async fn fetch_attestation(
		&self,
		transfer: &TokenTransfer,
		timeout: Duration,
	) -> Result<Vec<AttestationId>, PlatformError>;

	/// Builds the redeem transactions and submits them through `signer`.
	async fn complete_transfer(
		&self,
		transfer: &TokenTransfer,
		signer: &dyn Signer,
	) -> Result<Vec<TxId>, PlatformError>;
}

/// Service wrapping a platform implementation.
pub struct PlatformService {
	implementation: Box<dyn PlatformInterface>,
}

impl PlatformService {
	pub fn new(implementation: Box<dyn PlatformInterface>) -> Self {
		Self { implementation }
	}

	pub fn chain_context(&self, chain: &Chain) -> Result<ChainContext, PlatformError> {
		self.implementation.chain_context(chain)
	}

	/// Materializes a transfer aggregate.
	///
	/// Both ends must be platform chains and the token must live on the
	/// source chain.
	pub async fn create_transfer(
		&self,
		details: TransferDetails,
	) -> Result<TokenTransfer, PlatformError> {
		self.implementation.chain_context(&details.from.chain)?;
		self.implementation.chain_context(&details.to.chain)?;
		if details.token.chain != details.from.chain {
			return Err(PlatformError::InvalidTransfer(format!(
				"token lives on {}, transfer starts on {}",
				details.token.chain, details.from.chain
			)));
		}
		if details.amount.is_zero() {
			return Err(PlatformError::InvalidTransfer("amount is zero".into()));
		}

		let transfer = TokenTransfer::new(details);
		debug!(transfer_id = %transfer.id, "Transfer created");
		Ok(transfer)
	}

	/// Decimals of `token`; native tokens use the chain's configured precision.
	pub async fn token_decimals(&self, token: &TokenId) -> Result<u8, PlatformError> {
		match &token.address {
			TokenAddress::Native => Ok(self.implementation.chain_context(&token.chain)?.native_decimals),
			TokenAddress::Contract(_) => self.implementation.token_decimals(token).await,
		}
	}

	pub fn required_attestations(&self, transfer: &TokenTransfer) -> usize {
		self.implementation.required_attestations(transfer).max(1)
	}

	pub async fn initiate_transfer(
		&self,
		transfer: &TokenTransfer,
		signer: &dyn Signer,
	) -> Result<Vec<TxId>, PlatformError> {
		info!(
			transfer_id = %transfer.id,
			chain = %signer.chain(),
			"Initiating transfer"
		);
		self.implementation.initiate_transfer(transfer, signer).await
	}

	pub async fn fetch_attestation(
		&self,
		transfer: &TokenTransfer,
		timeout: Duration,
	) -> Result<Vec<AttestationId>, PlatformError> {
		debug!(transfer_id = %transfer.id, ?timeout, "Waiting for attestation");
		self.implementation.fetch_attestation(transfer, timeout).await
	}

	pub async fn complete_transfer(
		&self,
		transfer: &TokenTransfer,
		signer: &dyn Signer,
	) -> Result<Vec<TxId>, PlatformError> {
		info!(
			transfer_id = %transfer.id,
			chain = %signer.chain(),
			"Completing transfer"
		);
		self.implementation.complete_transfer(transfer, signer).await
	}
}
