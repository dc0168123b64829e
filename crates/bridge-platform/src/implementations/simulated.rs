//! Simulated platform for dry runs.
//!
//! Produces well-formed transactions for any chain in the registry and
//! attests them after a fixed delay, without touching a real bridge. Each call
//! to `fetch_attestation` releases one more message, which makes
//! multi-attestation transfers observable one step at a time.

use crate::{ChainContext, PlatformError, PlatformInterface};
use async_trait::async_trait;
use bridge_registry::ChainRegistry;
use bridge_signer::Signer;
use bridge_types::{
	AttestationId, Chain, ChainFamily, ConfigSchema, EvmTransaction, Field, FieldType, Network,
	Schema, SolanaTransaction, TokenAddress, TokenId, TokenTransfer, TransactionPayload, TxId,
	UnsignedTransaction, ValidationError, U256,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Emitter every simulated message is published from.
const EMITTER: &str = "000000000000000000000000db5492265f6038831e89f495670ff909ade94bd9";
const BRIDGE_CONTRACT: &str = "0xDB5492265f6038831E89f495670FF909aDe94bd9";

#[derive(Debug, Default)]
struct Progress {
	initiated_at: HashMap<String, Instant>,
	released: HashMap<String, usize>,
	next_sequence: u64,
	sequences: HashMap<String, u64>,
}

pub struct SimulatedPlatform {
	registry: Arc<ChainRegistry>,
	network: Network,
	attestation_delay: Duration,
	messages: usize,
	token_decimals: u8,
	fail_completion: Mutex<bool>,
	progress: Mutex<Progress>,
}

impl SimulatedPlatform {
	pub fn new(registry: Arc<ChainRegistry>, network: Network) -> Self {
		Self {
			registry,
			network,
			attestation_delay: Duration::ZERO,
			messages: 1,
			token_decimals: 6,
			fail_completion: Mutex::new(false),
			progress: Mutex::new(Progress::default()),
		}
	}

	pub fn with_attestation_delay(mut self, delay: Duration) -> Self {
		self.attestation_delay = delay;
		self
	}

	/// Messages each transfer emits; all of them must be attested.
	pub fn with_messages(mut self, messages: usize) -> Self {
		self.messages = messages.max(1);
		self
	}

	pub fn with_token_decimals(mut self, decimals: u8) -> Self {
		self.token_decimals = decimals;
		self
	}

	/// Makes completion fail until switched off again.
	pub fn fail_completion(&self, fail: bool) {
		*self.fail_completion.lock().unwrap_or_else(|e| e.into_inner()) = fail;
	}

	fn progress(&self) -> MutexGuard<'_, Progress> {
		self.progress.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn record_initiation(&self, progress: &mut Progress, transfer_id: &str) {
		progress
			.initiated_at
			.insert(transfer_id.to_string(), Instant::now());
		if !progress.sequences.contains_key(transfer_id) {
			let first = progress.next_sequence;
			progress.next_sequence += self.messages as u64;
			progress.sequences.insert(transfer_id.to_string(), first);
		}
	}

	fn payload(&self, context: &ChainContext, data: Vec<u8>, value: U256) -> TransactionPayload {
		match context.family {
			ChainFamily::Evm => TransactionPayload::Evm(EvmTransaction {
				to: BRIDGE_CONTRACT.to_string(),
				data,
				value,
				chain_id: self
					.registry
					.native_id(self.network, &context.chain)
					.ok()
					.and_then(|id| id.as_evm())
					.unwrap_or_default(),
				gas_limit: None,
			}),
			ChainFamily::Solana => TransactionPayload::Solana(SolanaTransaction { message: data }),
		}
	}
}

#[async_trait]
impl PlatformInterface for SimulatedPlatform {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedPlatformSchema)
	}

	fn chain_context(&self, chain: &Chain) -> Result<ChainContext, PlatformError> {
		let entry = self
			.registry
			.entry(self.network, chain)
			.ok_or_else(|| PlatformError::UnsupportedChain(chain.clone()))?;
		let family = entry.family();
		Ok(ChainContext {
			chain: chain.clone(),
			network: self.network,
			family,
			native_decimals: match family {
				ChainFamily::Evm => 18,
				ChainFamily::Solana => 9,
			},
			bridge_chain_id: entry.bridge_chain_id,
		})
	}

	async fn token_decimals(&self, token: &TokenId) -> Result<u8, PlatformError> {
		let context = self.chain_context(&token.chain)?;
		Ok(match token.address {
			TokenAddress::Native => context.native_decimals,
			TokenAddress::Contract(_) => self.token_decimals,
		})
	}

	fn required_attestations(&self, _transfer: &TokenTransfer) -> usize {
		self.messages
	}

	async fn initiate_transfer(
		&self,
		transfer: &TokenTransfer,
		signer: &dyn Signer,
	) -> Result<Vec<TxId>, PlatformError> {
		let details = &transfer.details;
		let context = self.chain_context(&details.from.chain)?;
		let memo = transfer.id.as_bytes().to_vec();

		let mut transactions = Vec::new();
		let value = match &details.token.address {
			TokenAddress::Native => details.amount.units,
			TokenAddress::Contract(token) => {
				transactions.push(UnsignedTransaction::new(
					context.chain.clone(),
					format!("ERC20.approve({})", token),
					self.payload(&context, memo.clone(), U256::ZERO),
				));
				U256::ZERO
			}
		};
		transactions.push(UnsignedTransaction::new(
			context.chain.clone(),
			"TokenBridge.transfer",
			self.payload(&context, memo, value),
		));

		let txids = signer.sign_and_send(transactions).await?;
		self.record_initiation(&mut self.progress(), &transfer.id);
		Ok(txids)
	}

	async fn fetch_attestation(
		&self,
		transfer: &TokenTransfer,
		timeout: Duration,
	) -> Result<Vec<AttestationId>, PlatformError> {
		let (initiated_at, first_sequence) = {
			let mut progress = self.progress();
			if !progress.initiated_at.contains_key(&transfer.id) {
				// Initiated by an earlier process; start the clock now.
				if transfer.source_txids.is_empty() {
					return Err(PlatformError::InvalidTransfer(
						"transfer was never initiated".into(),
					));
				}
				self.record_initiation(&mut progress, &transfer.id);
			}
			match (
				progress.initiated_at.get(&transfer.id),
				progress.sequences.get(&transfer.id),
			) {
				(Some(at), Some(seq)) => (*at, *seq),
				_ => {
					return Err(PlatformError::InvalidTransfer(
						"transfer was never initiated".into(),
					))
				}
			}
		};

		let wait = (initiated_at + self.attestation_delay).saturating_duration_since(Instant::now());
		if wait > timeout {
			tokio::time::sleep(timeout).await;
			return Err(PlatformError::AttestationTimeout(timeout));
		}
		tokio::time::sleep(wait).await;

		let context = self.chain_context(&transfer.details.from.chain)?;
		let released = {
			let mut progress = self.progress();
			let released = progress.released.entry(transfer.id.clone()).or_insert(0);
			*released = (*released + 1).min(self.messages);
			*released
		};
		debug!(transfer_id = %transfer.id, released, "Simulated attestations released");

		Ok((0..released as u64)
			.map(|i| AttestationId {
				chain: context.chain.clone(),
				bridge_chain_id: context.bridge_chain_id,
				emitter: EMITTER.to_string(),
				sequence: first_sequence + i,
			})
			.collect())
	}

	async fn complete_transfer(
		&self,
		transfer: &TokenTransfer,
		signer: &dyn Signer,
	) -> Result<Vec<TxId>, PlatformError> {
		if transfer.attestations.is_empty() {
			return Err(PlatformError::MissingAttestation);
		}
		if *self.fail_completion.lock().unwrap_or_else(|e| e.into_inner()) {
			return Err(PlatformError::Network("destination bridge rejected the message".into()));
		}

		let context = self.chain_context(&transfer.details.to.chain)?;
		let transactions = transfer
			.attestations
			.iter()
			.map(|attestation| {
				UnsignedTransaction::new(
					context.chain.clone(),
					format!("TokenBridge.completeTransfer({})", attestation),
					self.payload(&context, attestation.to_string().into_bytes(), U256::ZERO),
				)
			})
			.collect();
		Ok(signer.sign_and_send(transactions).await?)
	}
}

pub struct SimulatedPlatformSchema;

impl ConfigSchema for SimulatedPlatformSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"attestation_delay_ms",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
				Field::new(
					"messages",
					FieldType::Integer {
						min: Some(1),
						max: Some(16),
					},
				),
				Field::new(
					"token_decimals",
					FieldType::Integer {
						min: Some(0),
						max: Some(36),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a simulated platform from configuration.
///
/// Configuration parameters:
/// - `attestation_delay_ms`: time between initiation and attestation (default: 0)
/// - `messages`: attestations each transfer needs (default: 1)
/// - `token_decimals`: decimals reported for contract tokens (default: 6)
pub fn create_platform(
	config: &toml::Value,
	registry: Arc<ChainRegistry>,
	network: Network,
) -> Result<Box<dyn PlatformInterface>, PlatformError> {
	SimulatedPlatformSchema.validate(config)?;

	let int = |key: &str, default: i64| config.get(key).and_then(|v| v.as_integer()).unwrap_or(default);
	let platform = SimulatedPlatform::new(registry, network)
		.with_attestation_delay(Duration::from_millis(int("attestation_delay_ms", 0) as u64))
		.with_messages(int("messages", 1) as usize)
		.with_token_decimals(int("token_decimals", 6) as u8);
	Ok(Box::new(platform))
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_signer::implementations::evm::EvmSigner;
	use bridge_signer::implementations::memory::InMemoryWallet;
	use bridge_types::{Amount, ChainAddress, TransferDetails};

	fn registry() -> Arc<ChainRegistry> {
		Arc::new(ChainRegistry::with_defaults())
	}

	fn transfer(token: TokenId) -> TokenTransfer {
		TokenTransfer::new(TransferDetails {
			from: ChainAddress::new(Chain::new("Sepolia"), "0xaaa"),
			to: ChainAddress::new(Chain::new("Avalanche"), "0xaaa"),
			token,
			amount: Amount::parse("0.01", 18).unwrap(),
			automatic: false,
		})
	}

	async fn sepolia_signer(wallet: Arc<InMemoryWallet>) -> EvmSigner {
		EvmSigner::from_provider(wallet, &ChainRegistry::with_defaults(), Network::Testnet)
			.await
			.unwrap()
	}

	#[test]
	fn test_chain_context() {
		let platform = SimulatedPlatform::new(registry(), Network::Testnet);
		let context = platform.chain_context(&Chain::new("Sepolia")).unwrap();
		assert_eq!(context.native_decimals, 18);
		assert_eq!(context.bridge_chain_id, Some(10002));
		assert_eq!(
			platform
				.chain_context(&Chain::new("Solana"))
				.unwrap()
				.native_decimals,
			9
		);
		assert!(matches!(
			platform.chain_context(&Chain::new("Ethereum")),
			Err(PlatformError::UnsupportedChain(_))
		));
	}

	#[tokio::test]
	async fn test_contract_token_sends_approval_first() {
		let platform = SimulatedPlatform::new(registry(), Network::Testnet);
		let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa"], "0xaa36a7"));
		let signer = sepolia_signer(wallet.clone()).await;

		let token = TokenId::contract(Chain::new("Sepolia"), "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238");
		let txids = platform
			.initiate_transfer(&transfer(token), &signer)
			.await
			.unwrap();
		assert_eq!(txids.len(), 2);

		let sent = wallet.requests_for("eth_sendTransaction");
		assert_eq!(sent[0][0]["value"], "0x0");
	}

	#[tokio::test]
	async fn test_attestation_delay_and_timeout() {
		let platform = SimulatedPlatform::new(registry(), Network::Testnet)
			.with_attestation_delay(Duration::from_millis(50));
		let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa"], "0xaa36a7"));
		let signer = sepolia_signer(wallet).await;
		let transfer = transfer(TokenId::native(Chain::new("Sepolia")));

		assert!(matches!(
			platform.fetch_attestation(&transfer, Duration::from_millis(1)).await,
			Err(PlatformError::InvalidTransfer(_))
		));

		platform.initiate_transfer(&transfer, &signer).await.unwrap();
		assert!(matches!(
			platform.fetch_attestation(&transfer, Duration::from_millis(1)).await,
			Err(PlatformError::AttestationTimeout(_))
		));

		let attestations = platform
			.fetch_attestation(&transfer, Duration::from_secs(5))
			.await
			.unwrap();
		assert_eq!(attestations.len(), 1);
		assert!(attestations[0].to_string().starts_with("10002/"));
	}

	#[tokio::test]
	async fn test_adopts_transfer_initiated_elsewhere() {
		let platform = SimulatedPlatform::new(registry(), Network::Testnet);
		let mut transfer = transfer(TokenId::native(Chain::new("Sepolia")));
		transfer.source_txids = vec![TxId::new("0x01")];

		let attestations = platform
			.fetch_attestation(&transfer, Duration::from_secs(1))
			.await
			.unwrap();
		assert_eq!(attestations.len(), 1);
	}

	#[tokio::test]
	async fn test_messages_released_one_per_fetch() {
		let platform = SimulatedPlatform::new(registry(), Network::Testnet).with_messages(2);
		let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa"], "0xaa36a7"));
		let signer = sepolia_signer(wallet).await;
		let transfer = transfer(TokenId::native(Chain::new("Sepolia")));
		platform.initiate_transfer(&transfer, &signer).await.unwrap();

		let timeout = Duration::from_secs(1);
		assert_eq!(platform.fetch_attestation(&transfer, timeout).await.unwrap().len(), 1);
		assert_eq!(platform.fetch_attestation(&transfer, timeout).await.unwrap().len(), 2);
		assert_eq!(platform.fetch_attestation(&transfer, timeout).await.unwrap().len(), 2);
	}

	#[tokio::test]
	async fn test_complete_requires_attestation() {
		let platform = SimulatedPlatform::new(registry(), Network::Testnet);
		let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa"], "0xa869"));
		let signer = EvmSigner::from_provider(wallet.clone(), &ChainRegistry::with_defaults(), Network::Testnet)
			.await
			.unwrap();
		let transfer = transfer(TokenId::native(Chain::new("Sepolia")));

		assert!(matches!(
			platform.complete_transfer(&transfer, &signer).await,
			Err(PlatformError::MissingAttestation)
		));
		assert!(wallet.requests_for("eth_sendTransaction").is_empty());
	}

	#[test]
	fn test_factory_validates_config() {
		let config: toml::Value = toml::from_str("messages = 0").unwrap();
		assert!(create_platform(&config, registry(), Network::Testnet).is_err());

		let config: toml::Value = toml::from_str("attestation_delay_ms = 10").unwrap();
		assert!(create_platform(&config, registry(), Network::Testnet).is_ok());
	}
}
