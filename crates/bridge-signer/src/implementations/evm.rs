//! EVM wallet adapter.
//!
//! Talks EIP-1193 to the wallet: `eth_requestAccounts`, `eth_chainId`,
//! `eth_sendTransaction` and `wallet_switchEthereumChain`. Integer fields of a
//! transaction are sent as `0x` prefixed hex quantities.

use crate::{first_account, Signer, SignerError, WalletAdapter, WalletProvider};
use async_trait::async_trait;
use bridge_registry::ChainRegistry;
use bridge_types::{
	Chain, ChainFamily, EvmTransaction, NativeChainId, Network, TransactionPayload, TxId,
	UnsignedTransaction,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Parses a JSON-RPC quantity (`0x` hex) or a decimal string.
pub fn parse_quantity(raw: &str) -> Option<u64> {
	match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
		Some(hex) if !hex.is_empty() => u64::from_str_radix(hex, 16).ok(),
		Some(_) => None,
		None => raw.parse().ok(),
	}
}

pub fn encode_quantity(value: u64) -> String {
	format!("0x{:x}", value)
}

/// Signer backed by an EVM wallet provider.
pub struct EvmSigner {
	provider: Arc<dyn WalletProvider>,
	address: String,
	chain: Chain,
}

impl EvmSigner {
	pub async fn from_provider(
		provider: Arc<dyn WalletProvider>,
		registry: &ChainRegistry,
		network: Network,
	) -> Result<Self, SignerError> {
		let accounts = provider
			.request("eth_requestAccounts", json!([]))
			.await?;
		let address = first_account(&accounts).ok_or(SignerError::NoAccount)?;

		let raw_chain = match provider.request("eth_chainId", json!([])).await? {
			Value::String(s) if !s.is_empty() => s,
			Value::Number(n) => n.to_string(),
			_ => return Err(SignerError::NoChain),
		};
		let chain_id = parse_quantity(&raw_chain)
			.ok_or_else(|| SignerError::UnsupportedChain(raw_chain.clone()))?;

		let (actual, chain) = registry
			.resolve(&NativeChainId::Evm(chain_id))
			.map_err(|_| SignerError::UnsupportedChain(raw_chain.clone()))?;
		if actual != network {
			return Err(SignerError::NetworkMismatch {
				expected: network,
				actual,
			});
		}

		debug!(%chain, %address, "Resolved EVM wallet");
		Ok(Self {
			provider,
			address,
			chain,
		})
	}

	/// Converts a transaction into the request object `eth_sendTransaction` takes.
	fn encode(&self, tx: &EvmTransaction) -> Value {
		let mut request = json!({
			"from": self.address,
			"to": tx.to,
			"data": format!("0x{}", hex::encode(&tx.data)),
			"value": format!("0x{:x}", tx.value),
			"chainId": encode_quantity(tx.chain_id),
		});
		if let Some(gas) = tx.gas_limit {
			request["gas"] = Value::String(encode_quantity(gas));
		}
		request
	}
}

#[async_trait]
impl Signer for EvmSigner {
	fn chain(&self) -> &Chain {
		&self.chain
	}

	fn address(&self) -> &str {
		&self.address
	}

	async fn sign_and_send(
		&self,
		transactions: Vec<UnsignedTransaction>,
	) -> Result<Vec<TxId>, SignerError> {
		// Reject the whole batch up front so nothing is half submitted on a bad payload.
		let mut requests = Vec::with_capacity(transactions.len());
		for tx in &transactions {
			if tx.chain != self.chain {
				return Err(SignerError::ChainMismatch {
					expected: tx.chain.clone(),
					actual: self.chain.clone(),
				});
			}
			match &tx.payload {
				TransactionPayload::Evm(evm) => requests.push((&tx.description, self.encode(evm))),
				other => {
					return Err(SignerError::UnsupportedPayload {
						signer: ChainFamily::Evm,
						payload: other.family(),
					})
				}
			}
		}

		let mut txids = Vec::with_capacity(requests.len());
		for (description, request) in requests {
			info!(chain = %self.chain, "Signing {}", description);
			debug!(method = "eth_sendTransaction", request = %request, "Sending wallet request");

			let response = self
				.provider
				.request("eth_sendTransaction", json!([request]))
				.await;
			let txid = match response {
				Ok(Value::String(id)) if !id.is_empty() => TxId::new(id),
				Ok(_) => {
					return Err(SignerError::SignRejected {
						collected: txids,
						reason: format!("wallet returned no transaction id for '{}'", description),
					})
				}
				Err(e) => {
					return Err(SignerError::SignRejected {
						collected: txids,
						reason: e.to_string(),
					})
				}
			};

			info!(chain = %self.chain, txid = %txid, "Transaction submitted");
			txids.push(txid);
		}

		Ok(txids)
	}
}

pub struct EvmAdapter;

#[async_trait]
impl WalletAdapter for EvmAdapter {
	fn family(&self) -> ChainFamily {
		ChainFamily::Evm
	}

	async fn signer_from_provider(
		&self,
		provider: Arc<dyn WalletProvider>,
		registry: &ChainRegistry,
		network: Network,
	) -> Result<Arc<dyn Signer>, SignerError> {
		let signer = EvmSigner::from_provider(provider, registry, network).await?;
		Ok(Arc::new(signer))
	}

	async fn request_switch(
		&self,
		provider: &dyn WalletProvider,
		target: &NativeChainId,
	) -> Result<(), SignerError> {
		let chain_id = target.as_evm().ok_or(SignerError::SwitchUnsupported(ChainFamily::Evm))?;
		info!(chain_id, "Requesting wallet chain switch");
		provider
			.request(
				"wallet_switchEthereumChain",
				json!([{ "chainId": encode_quantity(chain_id) }]),
			)
			.await?;
		Ok(())
	}

	fn parse_chain_id(&self, raw: &str) -> Option<NativeChainId> {
		parse_quantity(raw).map(NativeChainId::Evm)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::InMemoryWallet;
	use bridge_types::{SolanaTransaction, U256};

	fn registry() -> ChainRegistry {
		ChainRegistry::with_defaults()
	}

	fn evm_tx(chain: &str, value: u64) -> UnsignedTransaction {
		UnsignedTransaction::new(
			Chain::new(chain),
			"TokenBridge.wrapAndTransferETH",
			TransactionPayload::Evm(EvmTransaction {
				to: "0xDB5492265f6038831E89f495670FF909aDe94bd9".into(),
				data: vec![0xde, 0xad],
				value: U256::from(value),
				chain_id: 11155111,
				gas_limit: None,
			}),
		)
	}

	#[test]
	fn test_parse_quantity() {
		assert_eq!(parse_quantity("0xaa36a7"), Some(11155111));
		assert_eq!(parse_quantity("43113"), Some(43113));
		assert_eq!(parse_quantity("0x"), None);
		assert_eq!(parse_quantity("sepolia"), None);
		assert_eq!(encode_quantity(43113), "0xa869");
	}

	#[tokio::test]
	async fn test_from_provider_binds_first_account_and_chain() {
		let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa", "0xbbb"], "0xaa36a7"));
		let signer = EvmSigner::from_provider(wallet, &registry(), Network::Testnet)
			.await
			.unwrap();
		assert_eq!(signer.address(), "0xaaa");
		assert_eq!(signer.chain(), &Chain::new("Sepolia"));
	}

	#[tokio::test]
	async fn test_from_provider_errors() {
		let no_accounts = Arc::new(InMemoryWallet::evm(&[], "0xaa36a7"));
		assert!(matches!(
			EvmSigner::from_provider(no_accounts, &registry(), Network::Testnet).await,
			Err(SignerError::NoAccount)
		));

		let no_chain = Arc::new(InMemoryWallet::evm(&["0xaaa"], ""));
		assert!(matches!(
			EvmSigner::from_provider(no_chain, &registry(), Network::Testnet).await,
			Err(SignerError::NoChain)
		));

		for unknown in ["0x539539", "0x3e7", "garbage"] {
			let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa"], unknown));
			assert!(matches!(
				EvmSigner::from_provider(wallet, &registry(), Network::Testnet).await,
				Err(SignerError::UnsupportedChain(_))
			));
		}

		// Ethereum mainnet while Testnet is configured
		let mainnet = Arc::new(InMemoryWallet::evm(&["0xaaa"], "0x1"));
		match EvmSigner::from_provider(mainnet, &registry(), Network::Testnet).await {
			Err(SignerError::NetworkMismatch { expected, actual }) => {
				assert_eq!(expected, Network::Testnet);
				assert_eq!(actual, Network::Mainnet);
			}
			other => panic!("expected network mismatch, got {:?}", other.err()),
		}
	}

	#[tokio::test]
	async fn test_sign_and_send_encodes_quantities() {
		let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa"], "0xaa36a7"));
		let signer = EvmSigner::from_provider(wallet.clone(), &registry(), Network::Testnet)
			.await
			.unwrap();

		let txids = signer
			.sign_and_send(vec![evm_tx("Sepolia", 10_000_000_000_000_000)])
			.await
			.unwrap();
		assert_eq!(txids.len(), 1);

		let sent = wallet.requests_for("eth_sendTransaction");
		assert_eq!(sent.len(), 1);
		let request = &sent[0][0];
		assert_eq!(request["value"], "0x2386f26fc10000");
		assert_eq!(request["chainId"], "0xaa36a7");
		assert_eq!(request["data"], "0xdead");
		assert_eq!(request["from"], "0xaaa");
	}

	#[tokio::test]
	async fn test_empty_batch_makes_no_requests() {
		let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa"], "0xaa36a7"));
		let signer = EvmSigner::from_provider(wallet.clone(), &registry(), Network::Testnet)
			.await
			.unwrap();
		let before = wallet.requests().len();

		assert!(signer.sign_and_send(vec![]).await.unwrap().is_empty());
		assert_eq!(wallet.requests().len(), before);
	}

	#[tokio::test]
	async fn test_rejection_reports_collected_ids() {
		let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa"], "0xaa36a7"));
		let signer = EvmSigner::from_provider(wallet.clone(), &registry(), Network::Testnet)
			.await
			.unwrap();
		wallet.reject_after(2);

		let batch = (0..4).map(|i| evm_tx("Sepolia", i)).collect();
		match signer.sign_and_send(batch).await {
			Err(SignerError::SignRejected { collected, .. }) => assert_eq!(collected.len(), 2),
			other => panic!("expected rejection, got {:?}", other),
		}
		// the fourth transaction was never sent
		assert_eq!(wallet.requests_for("eth_sendTransaction").len(), 3);
	}

	#[tokio::test]
	async fn test_foreign_payload_rejected_before_any_request() {
		let wallet = Arc::new(InMemoryWallet::evm(&["0xaaa"], "0xaa36a7"));
		let signer = EvmSigner::from_provider(wallet.clone(), &registry(), Network::Testnet)
			.await
			.unwrap();

		let solana_tx = UnsignedTransaction::new(
			Chain::new("Sepolia"),
			"bogus",
			TransactionPayload::Solana(SolanaTransaction { message: vec![1] }),
		);
		let result = signer
			.sign_and_send(vec![evm_tx("Sepolia", 1), solana_tx])
			.await;
		assert!(matches!(result, Err(SignerError::UnsupportedPayload { .. })));

		let wrong_chain = signer.sign_and_send(vec![evm_tx("Avalanche", 1)]).await;
		assert!(matches!(wrong_chain, Err(SignerError::ChainMismatch { .. })));
		assert!(wallet.requests_for("eth_sendTransaction").is_empty());
	}
}
