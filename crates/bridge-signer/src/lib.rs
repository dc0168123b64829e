//! Wallet signers for the bridge wallet.
//!
//! A [`Signer`] binds one wallet connection to one chain and can sign and
//! broadcast transactions for it. Each chain family has its own adapter that
//! knows how to talk to that family's wallets through a [`WalletProvider`];
//! callers only ever see the uniform [`Signer`] contract.

use async_trait::async_trait;
use bridge_registry::{ChainRegistry, RegistryError};
use bridge_types::{
	Chain, ChainAddress, ChainFamily, NativeChainId, Network, TxId, UnsignedTransaction,
	ValidationError,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod session;

/// Re-export implementations
pub mod implementations {
	pub mod evm;
	pub mod jsonrpc;
	pub mod memory;
	pub mod solana;
}

pub use session::{BoundSigner, SignerSource, WalletSession};

/// Errors raised while connecting to or signing with a wallet.
#[derive(Debug, Error)]
pub enum SignerError {
	/// The account listing was empty or missing.
	#[error("Wallet returned no account")]
	NoAccount,
	/// The wallet did not report its active chain.
	#[error("Wallet returned no chain id")]
	NoChain,
	/// The wallet's chain id is not in the registry. Carries the raw id.
	#[error("Wallet is on an unsupported chain: {0}")]
	UnsupportedChain(String),
	/// The wallet's chain belongs to another network than the configured one.
	#[error("Wallet is on {actual} but {expected} is configured")]
	NetworkMismatch { expected: Network, actual: Network },
	/// A signer was used for a chain other than the one it is bound to.
	#[error("Signer is bound to {actual}, expected {expected}")]
	ChainMismatch { expected: Chain, actual: Chain },
	/// The wallet returned no id for a transaction.
	///
	/// `collected` holds the ids of the transactions submitted before it.
	#[error("Transaction rejected after {} submitted: {reason}", collected.len())]
	SignRejected { collected: Vec<TxId>, reason: String },
	/// The payload belongs to another chain family.
	#[error("{signer} signer cannot sign {payload} transactions")]
	UnsupportedPayload {
		signer: ChainFamily,
		payload: ChainFamily,
	},
	/// A switch target outside the session's chain family.
	#[error("{chain} is not a {family} chain")]
	WrongFamily { chain: Chain, family: ChainFamily },
	#[error("{0} wallets cannot switch chains on request")]
	SwitchUnsupported(ChainFamily),
	/// The signer was revoked after a chain or account change.
	#[error("Signer was invalidated by a wallet change")]
	Stale,
	#[error("Wallet not connected")]
	Disconnected,
	/// Chain id lookup failed.
	#[error("Registry error: {0}")]
	Registry(#[from] RegistryError),
	/// Transport failure or an error answer from the wallet.
	#[error("Provider error: {0}")]
	Provider(String),
	/// Invalid wallet backend configuration.
	#[error("Invalid wallet configuration: {0}")]
	Config(String),
}

impl From<ValidationError> for SignerError {
	fn from(err: ValidationError) -> Self {
		SignerError::Config(err.to_string())
	}
}

/// Uniform signing capability bound to one wallet session and one chain.
#[async_trait]
pub trait Signer: Send + Sync {
	/// Chain this signer submits to.
	fn chain(&self) -> &Chain;

	/// Account the wallet signs with.
	fn address(&self) -> &str;

	/// Signs and broadcasts each transaction in order.
	///
	/// Returns one id per input transaction. If the wallet yields no id for a
	/// transaction the call fails with [`SignerError::SignRejected`] carrying
	/// the ids already collected; those transactions stay submitted.
	async fn sign_and_send(
		&self,
		transactions: Vec<UnsignedTransaction>,
	) -> Result<Vec<TxId>, SignerError>;

	fn chain_address(&self) -> ChainAddress {
		ChainAddress::new(self.chain().clone(), self.address())
	}
}

/// Notifications pushed by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
	/// The wallet's active chain changed; carries the raw chain id.
	ChainChanged(String),
	AccountsChanged(Vec<String>),
	Disconnected,
}

/// Request/response channel to a wallet.
///
/// Mirrors the EIP-1193 shape: a missing answer is `Value::Null`, transport
/// failures and wallet errors are `Err`.
#[async_trait]
pub trait WalletProvider: Send + Sync {
	/// Opens the connection; wallets may prompt the user here.
	async fn connect(&self) -> Result<(), SignerError>;

	/// Sends one request and waits for the wallet's answer.
	async fn request(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<serde_json::Value, SignerError>;

	/// Receiver for chain, account and connection notifications.
	fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Per chain family knowledge of how to build a signer from a provider.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
	fn family(&self) -> ChainFamily;

	/// Runs the construction protocol: accounts, active chain, registry lookup,
	/// network check.
	async fn signer_from_provider(
		&self,
		provider: Arc<dyn WalletProvider>,
		registry: &ChainRegistry,
		network: Network,
	) -> Result<Arc<dyn Signer>, SignerError>;

	/// Asks the wallet to change its active chain.
	async fn request_switch(
		&self,
		provider: &dyn WalletProvider,
		target: &NativeChainId,
	) -> Result<(), SignerError>;

	/// Parses a raw chain id as carried by [`ProviderEvent::ChainChanged`].
	fn parse_chain_id(&self, raw: &str) -> Option<NativeChainId>;
}

/// Returns the adapter for a chain family.
pub fn adapter_for(family: ChainFamily) -> Arc<dyn WalletAdapter> {
	match family {
		ChainFamily::Evm => Arc::new(implementations::evm::EvmAdapter),
		ChainFamily::Solana => Arc::new(implementations::solana::SolanaAdapter),
	}
}

/// First non-empty account string from an account listing response.
pub(crate) fn first_account(response: &serde_json::Value) -> Option<String> {
	response
		.as_array()?
		.iter()
		.filter_map(|a| a.as_str())
		.find(|a| !a.is_empty())
		.map(str::to_string)
}
