//! Token bridge platform for EVM chains.
//!
//! Locks (or burns) tokens in the source chain's token bridge contract, reads
//! the message sequence from the core bridge's `LogMessagePublished` log, polls
//! the guardian REST API for the signed VAA and redeems it on the destination
//! chain with `completeTransfer`.

use crate::{ChainContext, PlatformError, PlatformInterface};
use alloy::primitives::{Address, FixedBytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bridge_registry::ChainRegistry;
use bridge_signer::Signer;
use bridge_types::{
	evm_address, http_url, AttestationId, Chain, ChainFamily, ConfigSchema, EvmTransaction, Field,
	FieldType, Network, Schema, TokenAddress, TokenId, TokenTransfer, TransactionPayload, TxId,
	UnsignedTransaction, ValidationError,
};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

sol! {
	#[sol(rpc)]
	interface IERC20 {
		function decimals() external view returns (uint8);
		function approve(address spender, uint256 amount) external returns (bool);
	}

	interface ITokenBridge {
		function wrapAndTransferETH(uint16 recipientChain, bytes32 recipient, uint256 arbiterFee, uint32 nonce) external payable returns (uint64 sequence);
		function transferTokens(address token, uint256 amount, uint16 recipientChain, bytes32 recipient, uint256 arbiterFee, uint32 nonce) external payable returns (uint64 sequence);
		function completeTransfer(bytes encodedVm) external;
	}

	interface IWormhole {
		event LogMessagePublished(address indexed sender, uint64 sequence, uint32 nonce, bytes payload, uint8 consistencyLevel);
	}
}

/// Per chain contract deployment.
struct Deployment {
	context: ChainContext,
	chain_id: u64,
	provider: DynProvider,
	token_bridge: Address,
	core_bridge: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedVaaResponse {
	vaa_bytes: String,
}

pub struct TokenBridgePlatform {
	deployments: HashMap<Chain, Deployment>,
	client: reqwest::Client,
	guardian_url: String,
	poll_interval: Duration,
	/// Signed VAAs keyed by attestation display form.
	vaas: DashMap<String, Vec<u8>>,
}

/// Left pads a hex address into the 32-byte universal address form.
fn universal_address(address: &str) -> Result<FixedBytes<32>, PlatformError> {
	let digits = address.strip_prefix("0x").unwrap_or(address);
	let bytes = hex::decode(digits)
		.map_err(|_| PlatformError::InvalidTransfer(format!("recipient {} is not hex", address)))?;
	if bytes.len() > 32 {
		return Err(PlatformError::InvalidTransfer(format!(
			"recipient {} is longer than 32 bytes",
			address
		)));
	}
	let mut padded = [0u8; 32];
	padded[32 - bytes.len()..].copy_from_slice(&bytes);
	Ok(FixedBytes::from(padded))
}

fn parse_address(field: &str, value: &str) -> Result<Address, PlatformError> {
	Address::from_str(value)
		.map_err(|e| PlatformError::Config(format!("{}: invalid address {}: {}", field, value, e)))
}

impl TokenBridgePlatform {
	fn deployment(&self, chain: &Chain) -> Result<&Deployment, PlatformError> {
		self.deployments
			.get(chain)
			.ok_or_else(|| PlatformError::UnsupportedChain(chain.clone()))
	}

	fn evm_transaction(
		deployment: &Deployment,
		description: impl Into<String>,
		to: Address,
		data: Vec<u8>,
		value: U256,
	) -> UnsignedTransaction {
		UnsignedTransaction::new(
			deployment.context.chain.clone(),
			description,
			TransactionPayload::Evm(EvmTransaction {
				to: to.to_string(),
				data,
				value,
				chain_id: deployment.chain_id,
				gas_limit: None,
			}),
		)
	}

	/// Reads the bridge messages emitted by the source transactions.
	///
	/// Returns `None` while any receipt is still missing.
	async fn published_messages(
		&self,
		source: &Deployment,
		transfer: &TokenTransfer,
	) -> Result<Option<Vec<AttestationId>>, PlatformError> {
		let mut messages = Vec::new();
		for txid in &transfer.source_txids {
			let hash = B256::from_str(txid.as_str())
				.map_err(|_| PlatformError::InvalidTransfer(format!("bad tx hash {}", txid)))?;
			let receipt = source
				.provider
				.get_transaction_receipt(hash)
				.await
				.map_err(|e| PlatformError::Network(format!("Failed to get receipt: {}", e)))?;
			let Some(receipt) = receipt else {
				return Ok(None);
			};
			if !receipt.status() {
				return Err(PlatformError::InvalidTransfer(format!(
					"source transaction {} reverted",
					txid
				)));
			}

			for log in receipt.inner.logs() {
				if log.address() != source.core_bridge {
					continue;
				}
				let Ok(decoded) = log.log_decode::<IWormhole::LogMessagePublished>() else {
					continue;
				};
				let event = decoded.inner.data;
				messages.push(AttestationId {
					chain: source.context.chain.clone(),
					bridge_chain_id: source.context.bridge_chain_id,
					emitter: hex::encode(event.sender.into_word()),
					sequence: event.sequence,
				});
			}
		}
		Ok(Some(messages))
	}

	/// Single guardian lookup; `None` while the VAA is not signed yet.
	async fn signed_vaa(&self, attestation: &AttestationId) -> Result<Option<Vec<u8>>, PlatformError> {
		let key = attestation.to_string();
		if let Some(vaa) = self.vaas.get(&key) {
			return Ok(Some(vaa.clone()));
		}

		let url = format!("{}/v1/signed_vaa/{}", self.guardian_url.trim_end_matches('/'), key);
		let response = self
			.client
			.get(&url)
			.send()
			.await
			.map_err(|e| PlatformError::Network(e.to_string()))?;

		let status = response.status();
		if status == reqwest::StatusCode::NOT_FOUND {
			return Ok(None);
		}
		if status.is_server_error() {
			warn!(%status, url = %url, "Guardian API unavailable");
			return Ok(None);
		}
		if !status.is_success() {
			return Err(PlatformError::Network(format!("guardian API returned {}", status)));
		}

		let body: SignedVaaResponse = response
			.json()
			.await
			.map_err(|e| PlatformError::Network(format!("invalid guardian response: {}", e)))?;
		let vaa = BASE64
			.decode(body.vaa_bytes)
			.map_err(|e| PlatformError::Network(format!("invalid VAA encoding: {}", e)))?;

		self.vaas.insert(key, vaa.clone());
		Ok(Some(vaa))
	}

	async fn poll(&self, transfer: &TokenTransfer) -> Result<Vec<AttestationId>, PlatformError> {
		let source = self.deployment(&transfer.details.from.chain)?;

		let messages = loop {
			match self.published_messages(source, transfer).await? {
				Some(messages) if !messages.is_empty() => break messages,
				Some(_) => {
					return Err(PlatformError::InvalidTransfer(
						"source transactions published no bridge message".into(),
					))
				}
				None => {
					debug!(transfer_id = %transfer.id, "Source receipt pending");
					tokio::time::sleep(self.poll_interval).await;
				}
			}
		};

		for message in &messages {
			while self.signed_vaa(message).await?.is_none() {
				debug!(attestation = %message, "VAA not signed yet");
				tokio::time::sleep(self.poll_interval).await;
			}
			info!(transfer_id = %transfer.id, attestation = %message, "VAA signed");
		}
		Ok(messages)
	}
}

#[async_trait]
impl PlatformInterface for TokenBridgePlatform {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(TokenBridgeSchema)
	}

	fn chain_context(&self, chain: &Chain) -> Result<ChainContext, PlatformError> {
		Ok(self.deployment(chain)?.context.clone())
	}

	async fn token_decimals(&self, token: &TokenId) -> Result<u8, PlatformError> {
		let deployment = self.deployment(&token.chain)?;
		match &token.address {
			TokenAddress::Native => Ok(deployment.context.native_decimals),
			TokenAddress::Contract(address) => {
				let address = parse_address("token", address)?;
				let erc20 = IERC20::new(address, deployment.provider.clone());
				erc20
					.decimals()
					.call()
					.await
					.map_err(|e| PlatformError::Network(format!("Failed to read decimals: {}", e)))
			}
		}
	}

	async fn initiate_transfer(
		&self,
		transfer: &TokenTransfer,
		signer: &dyn Signer,
	) -> Result<Vec<TxId>, PlatformError> {
		let details = &transfer.details;
		let source = self.deployment(&details.from.chain)?;
		let destination = self.chain_context(&details.to.chain)?;
		let recipient_chain = destination.bridge_chain_id.ok_or_else(|| {
			PlatformError::InvalidTransfer(format!("{} has no bridge chain id", details.to.chain))
		})?;
		let recipient = universal_address(&details.to.address)?;
		let nonce = chrono::Utc::now().timestamp_subsec_nanos();
		let amount = details.amount.units;

		let transactions = match &details.token.address {
			TokenAddress::Native => vec![Self::evm_transaction(
				source,
				"TokenBridge.wrapAndTransferETH",
				source.token_bridge,
				ITokenBridge::wrapAndTransferETHCall {
					recipientChain: recipient_chain,
					recipient,
					arbiterFee: U256::ZERO,
					nonce,
				}
				.abi_encode(),
				amount,
			)],
			TokenAddress::Contract(token) => {
				let token = parse_address("token", token)?;
				vec![
					Self::evm_transaction(
						source,
						"ERC20.approve",
						token,
						IERC20::approveCall {
							spender: source.token_bridge,
							amount,
						}
						.abi_encode(),
						U256::ZERO,
					),
					Self::evm_transaction(
						source,
						"TokenBridge.transferTokens",
						source.token_bridge,
						ITokenBridge::transferTokensCall {
							token,
							amount,
							recipientChain: recipient_chain,
							recipient,
							arbiterFee: U256::ZERO,
							nonce,
						}
						.abi_encode(),
						U256::ZERO,
					),
				]
			}
		};

		Ok(signer.sign_and_send(transactions).await?)
	}

	async fn fetch_attestation(
		&self,
		transfer: &TokenTransfer,
		timeout: Duration,
	) -> Result<Vec<AttestationId>, PlatformError> {
		if transfer.source_txids.is_empty() {
			return Err(PlatformError::InvalidTransfer("no source transactions".into()));
		}
		match tokio::time::timeout(timeout, self.poll(transfer)).await {
			Ok(result) => result,
			Err(_) => Err(PlatformError::AttestationTimeout(timeout)),
		}
	}

	async fn complete_transfer(
		&self,
		transfer: &TokenTransfer,
		signer: &dyn Signer,
	) -> Result<Vec<TxId>, PlatformError> {
		if transfer.attestations.is_empty() {
			return Err(PlatformError::MissingAttestation);
		}
		let destination = self.deployment(&transfer.details.to.chain)?;

		let mut transactions = Vec::with_capacity(transfer.attestations.len());
		for attestation in &transfer.attestations {
			let vaa = self
				.signed_vaa(attestation)
				.await?
				.ok_or(PlatformError::MissingAttestation)?;
			transactions.push(Self::evm_transaction(
				destination,
				format!("TokenBridge.completeTransfer({})", attestation),
				destination.token_bridge,
				ITokenBridge::completeTransferCall {
					encodedVm: vaa.into(),
				}
				.abi_encode(),
				U256::ZERO,
			));
		}

		Ok(signer.sign_and_send(transactions).await?)
	}
}

pub struct TokenBridgeSchema;

impl ConfigSchema for TokenBridgeSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let chain = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(http_url),
				Field::new("token_bridge", FieldType::String).with_validator(evm_address),
				Field::new("core_bridge", FieldType::String).with_validator(evm_address),
			],
			vec![Field::new(
				"native_decimals",
				FieldType::Integer {
					min: Some(0),
					max: Some(36),
				},
			)],
		);
		let schema = Schema::new(
			vec![
				Field::new("guardian_url", FieldType::String).with_validator(http_url),
				Field::new("chains", FieldType::Map(chain)),
			],
			vec![
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(10),
						max: None,
					},
				),
				Field::new(
					"timeout_ms",
					FieldType::Integer {
						min: Some(100),
						max: None,
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a token bridge platform from configuration.
///
/// Configuration parameters:
/// - `guardian_url`: guardian REST API base URL
/// - `poll_interval_ms`: receipt and VAA poll interval (default: 2000)
/// - `timeout_ms`: HTTP request timeout (default: 10000)
/// - `chains.<name>`: `rpc_url`, `token_bridge`, `core_bridge`, optional `native_decimals`
///
/// Every configured chain must be an EVM chain of `network` in the registry.
pub fn create_platform(
	config: &toml::Value,
	registry: Arc<ChainRegistry>,
	network: Network,
) -> Result<Box<dyn PlatformInterface>, PlatformError> {
	TokenBridgeSchema.validate(config)?;

	let int = |key: &str, default: i64| config.get(key).and_then(|v| v.as_integer()).unwrap_or(default);
	let guardian_url = config
		.get("guardian_url")
		.and_then(|v| v.as_str())
		.unwrap_or_default()
		.to_string();

	let mut deployments = HashMap::new();
	let chains = config.get("chains").and_then(|v| v.as_table());
	for (name, table) in chains.into_iter().flatten() {
		let chain = Chain::new(name.as_str());
		let entry = registry
			.entry(network, &chain)
			.ok_or_else(|| PlatformError::UnsupportedChain(chain.clone()))?;
		let chain_id = entry.native_id.as_evm().ok_or_else(|| {
			PlatformError::Config(format!("{} is not an EVM chain", chain))
		})?;

		let get = |key: &str| table.get(key).and_then(|v| v.as_str()).unwrap_or_default();
		let rpc_url = get("rpc_url")
			.parse()
			.map_err(|e| PlatformError::Config(format!("chains.{}.rpc_url: {}", name, e)))?;
		let provider = ProviderBuilder::new().connect_http(rpc_url).erased();

		let deployment = Deployment {
			context: ChainContext {
				chain: chain.clone(),
				network,
				family: ChainFamily::Evm,
				native_decimals: table
					.get("native_decimals")
					.and_then(|v| v.as_integer())
					.unwrap_or(18) as u8,
				bridge_chain_id: entry.bridge_chain_id,
			},
			chain_id,
			provider,
			token_bridge: parse_address("token_bridge", get("token_bridge"))?,
			core_bridge: parse_address("core_bridge", get("core_bridge"))?,
		};
		debug!(%chain, chain_id, "Token bridge deployment loaded");
		deployments.insert(chain, deployment);
	}

	let client = reqwest::Client::builder()
		.timeout(Duration::from_millis(int("timeout_ms", 10_000) as u64))
		.build()
		.map_err(|e| PlatformError::Config(e.to_string()))?;

	Ok(Box::new(TokenBridgePlatform {
		deployments,
		client,
		guardian_url,
		poll_interval: Duration::from_millis(int("poll_interval_ms", 2_000) as u64),
		vaas: DashMap::new(),
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use bridge_types::{Amount, ChainAddress, TransferDetails};
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const SEPOLIA_TOKEN_BRIDGE: &str = "0xDB5492265f6038831E89f495670FF909aDe94bd9";
	const SEPOLIA_CORE_BRIDGE: &str = "0x4a8bc80Ed5a4067f1CCf107057b8270E0cC11A78";
	const FUJI_TOKEN_BRIDGE: &str = "0x61E44E506Ca5659E6c0bba9b678586fA2d729756";
	const FUJI_CORE_BRIDGE: &str = "0x7bbcE28e64B3F8b84d876Ab298393c38ad7aac4C";

	fn config(guardian_url: &str) -> toml::Value {
		toml::from_str(&format!(
			r#"
guardian_url = "{guardian_url}"
poll_interval_ms = 10

[chains.Sepolia]
rpc_url = "http://127.0.0.1:1"
token_bridge = "{SEPOLIA_TOKEN_BRIDGE}"
core_bridge = "{SEPOLIA_CORE_BRIDGE}"

[chains.Avalanche]
rpc_url = "http://127.0.0.1:1"
token_bridge = "{FUJI_TOKEN_BRIDGE}"
core_bridge = "{FUJI_CORE_BRIDGE}"
"#
		))
		.unwrap()
	}

	fn platform(guardian_url: &str) -> Box<dyn PlatformInterface> {
		create_platform(
			&config(guardian_url),
			Arc::new(ChainRegistry::with_defaults()),
			Network::Testnet,
		)
		.unwrap()
	}

	fn attestation() -> AttestationId {
		AttestationId {
			chain: Chain::new("Sepolia"),
			bridge_chain_id: Some(10002),
			emitter: "000000000000000000000000db5492265f6038831e89f495670ff909ade94bd9".into(),
			sequence: 4242,
		}
	}

	fn transfer() -> TokenTransfer {
		TokenTransfer::new(TransferDetails {
			from: ChainAddress::new(Chain::new("Sepolia"), "0x8ba1f109551bD432803012645Ac136ddd64DBA72"),
			to: ChainAddress::new(Chain::new("Avalanche"), "0x8ba1f109551bD432803012645Ac136ddd64DBA72"),
			token: TokenId::native(Chain::new("Sepolia")),
			amount: Amount::parse("0.01", 18).unwrap(),
			automatic: false,
		})
	}

	#[test]
	fn test_universal_address() {
		let padded = universal_address("0x8ba1f109551bD432803012645Ac136ddd64DBA72").unwrap();
		assert_eq!(&padded[..12], &[0u8; 12]);
		assert_eq!(padded[12], 0x8b);
		assert!(universal_address("not hex").is_err());
	}

	#[test]
	fn test_schema_rejects_bad_addresses() {
		let mut bad = config("https://api.testnet.wormholescan.io");
		bad["chains"]["Sepolia"]["core_bridge"] = toml::Value::String("0x1234".into());
		assert!(TokenBridgeSchema.validate(&bad).is_err());
	}

	#[test]
	fn test_chain_context_from_registry() {
		let platform = platform("https://api.testnet.wormholescan.io");
		let context = platform.chain_context(&Chain::new("Avalanche")).unwrap();
		assert_eq!(context.bridge_chain_id, Some(6));
		assert_eq!(context.native_decimals, 18);
		assert!(matches!(
			platform.chain_context(&Chain::new("Polygon")),
			Err(PlatformError::UnsupportedChain(_))
		));
	}

	#[test]
	fn test_chain_outside_network_rejected() {
		let mut config = config("https://api.testnet.wormholescan.io");
		let sepolia = config["chains"]["Sepolia"].clone();
		if let Some(chains) = config["chains"].as_table_mut() {
			// Ethereum is a mainnet chain, the platform runs on testnet
			chains.insert("Ethereum".into(), sepolia);
		}
		assert!(matches!(
			create_platform(
				&config,
				Arc::new(ChainRegistry::with_defaults()),
				Network::Testnet
			),
			Err(PlatformError::UnsupportedChain(_))
		));
	}

	#[tokio::test]
	async fn test_signed_vaa_polled_from_guardian() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path(format!("/v1/signed_vaa/{}", attestation())))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(serde_json::json!({ "vaaBytes": "AQAAAAA=" })),
			)
			.mount(&server)
			.await;

		let platform = create_platform(
			&config(&server.uri()),
			Arc::new(ChainRegistry::with_defaults()),
			Network::Testnet,
		)
		.unwrap();

		let mut transfer = transfer();
		transfer.attestations.push(attestation());

		let wallet = Arc::new(bridge_signer::implementations::memory::InMemoryWallet::evm(
			&["0x8ba1f109551bD432803012645Ac136ddd64DBA72"],
			"0xa869",
		));
		let signer = bridge_signer::implementations::evm::EvmSigner::from_provider(
			wallet.clone(),
			&ChainRegistry::with_defaults(),
			Network::Testnet,
		)
		.await
		.unwrap();

		let txids = platform.complete_transfer(&transfer, &signer).await.unwrap();
		assert_eq!(txids.len(), 1);

		let sent = wallet.requests_for("eth_sendTransaction");
		let data = sent[0][0]["data"].as_str().unwrap();
		let selector = hex::encode(ITokenBridge::completeTransferCall::SELECTOR);
		assert!(data.starts_with(&format!("0x{}", selector)));
		assert_eq!(
			sent[0][0]["to"].as_str().unwrap().to_lowercase(),
			FUJI_TOKEN_BRIDGE.to_lowercase()
		);
	}

	#[tokio::test]
	async fn test_missing_vaa_is_reported() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(404))
			.mount(&server)
			.await;
		let platform = platform(&server.uri());

		let mut transfer = transfer();
		transfer.attestations.push(attestation());
		let wallet = Arc::new(bridge_signer::implementations::memory::InMemoryWallet::evm(
			&["0xaaa"],
			"0xa869",
		));
		let signer = bridge_signer::implementations::evm::EvmSigner::from_provider(
			wallet,
			&ChainRegistry::with_defaults(),
			Network::Testnet,
		)
		.await
		.unwrap();

		assert!(matches!(
			platform.complete_transfer(&transfer, &signer).await,
			Err(PlatformError::MissingAttestation)
		));
	}

	#[tokio::test]
	async fn test_native_transfer_wraps_eth() {
		let platform = platform("https://api.testnet.wormholescan.io");
		let wallet = Arc::new(bridge_signer::implementations::memory::InMemoryWallet::evm(
			&["0x8ba1f109551bD432803012645Ac136ddd64DBA72"],
			"0xaa36a7",
		));
		let signer = bridge_signer::implementations::evm::EvmSigner::from_provider(
			wallet.clone(),
			&ChainRegistry::with_defaults(),
			Network::Testnet,
		)
		.await
		.unwrap();

		let txids = platform.initiate_transfer(&transfer(), &signer).await.unwrap();
		assert_eq!(txids.len(), 1);

		let sent = wallet.requests_for("eth_sendTransaction");
		let request = &sent[0][0];
		assert_eq!(request["value"], "0x2386f26fc10000");
		let data = hex::decode(request["data"].as_str().unwrap().trim_start_matches("0x")).unwrap();
		let call = ITokenBridge::wrapAndTransferETHCall::abi_decode(&data).unwrap();
		assert_eq!(call.recipientChain, 6);
		assert_eq!(call.arbiterFee, U256::ZERO);
	}

	#[tokio::test]
	async fn test_fetch_without_source_txids() {
		let platform = platform("https://api.testnet.wormholescan.io");
		assert!(matches!(
			platform
				.fetch_attestation(&transfer(), Duration::from_millis(1))
				.await,
			Err(PlatformError::InvalidTransfer(_))
		));
	}
}
