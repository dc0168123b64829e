//! Solana wallet adapter.
//!
//! Solana wallets report their cluster rather than a numeric id, either bare
//! (`devnet`) or CAIP-2 prefixed (`solana:devnet`). Transactions are handed to
//! the wallet as base64 encoded messages.

use crate::{first_account, Signer, SignerError, WalletAdapter, WalletProvider};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bridge_registry::ChainRegistry;
use bridge_types::{
	Chain, ChainFamily, NativeChainId, Network, TransactionPayload, TxId, UnsignedTransaction,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

fn cluster_name(raw: &str) -> Option<&str> {
	let cluster = raw.strip_prefix("solana:").unwrap_or(raw);
	(!cluster.is_empty()).then_some(cluster)
}

pub struct SolanaSigner {
	provider: Arc<dyn WalletProvider>,
	address: String,
	chain: Chain,
}

impl SolanaSigner {
	pub async fn from_provider(
		provider: Arc<dyn WalletProvider>,
		registry: &ChainRegistry,
		network: Network,
	) -> Result<Self, SignerError> {
		let accounts = provider
			.request("solana_requestAccounts", json!([]))
			.await?;
		let address = first_account(&accounts).ok_or(SignerError::NoAccount)?;

		let raw_cluster = match provider.request("solana_chainId", json!([])).await? {
			Value::String(s) => s,
			_ => return Err(SignerError::NoChain),
		};
		let cluster = cluster_name(&raw_cluster).ok_or(SignerError::NoChain)?;

		let (actual, chain) = registry
			.resolve(&NativeChainId::Solana(cluster.to_string()))
			.map_err(|_| SignerError::UnsupportedChain(raw_cluster.clone()))?;
		if actual != network {
			return Err(SignerError::NetworkMismatch {
				expected: network,
				actual,
			});
		}

		debug!(%chain, %address, cluster, "Resolved Solana wallet");
		Ok(Self {
			provider,
			address,
			chain,
		})
	}
}

#[async_trait]
impl Signer for SolanaSigner {
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
		let mut messages = Vec::with_capacity(transactions.len());
		for tx in &transactions {
			if tx.chain != self.chain {
				return Err(SignerError::ChainMismatch {
					expected: tx.chain.clone(),
					actual: self.chain.clone(),
				});
			}
			match &tx.payload {
				TransactionPayload::Solana(sol) => {
					messages.push((&tx.description, BASE64.encode(&sol.message)))
				}
				other => {
					return Err(SignerError::UnsupportedPayload {
						signer: ChainFamily::Solana,
						payload: other.family(),
					})
				}
			}
		}

		let mut txids = Vec::with_capacity(messages.len());
		for (description, message) in messages {
			info!(chain = %self.chain, "Signing {}", description);

			let params = json!({
				"transaction": message,
				"options": { "preflightCommitment": "confirmed" },
			});
			let signature = match self
				.provider
				.request("solana_signAndSendTransaction", params)
				.await
			{
				Ok(Value::Object(map)) => map
					.get("signature")
					.and_then(|s| s.as_str())
					.filter(|s| !s.is_empty())
					.map(str::to_string),
				Ok(Value::String(s)) if !s.is_empty() => Some(s),
				Ok(_) => None,
				Err(e) => {
					return Err(SignerError::SignRejected {
						collected: txids,
						reason: e.to_string(),
					})
				}
			};

			match signature {
				Some(signature) => {
					info!(chain = %self.chain, txid = %signature, "Transaction submitted");
					txids.push(TxId::new(signature));
				}
				None => {
					return Err(SignerError::SignRejected {
						collected: txids,
						reason: format!("wallet returned no signature for '{}'", description),
					})
				}
			}
		}

		Ok(txids)
	}
}

pub struct SolanaAdapter;

#[async_trait]
impl WalletAdapter for SolanaAdapter {
	fn family(&self) -> ChainFamily {
		ChainFamily::Solana
	}

	async fn signer_from_provider(
		&self,
		provider: Arc<dyn WalletProvider>,
		registry: &ChainRegistry,
		network: Network,
	) -> Result<Arc<dyn Signer>, SignerError> {
		let signer = SolanaSigner::from_provider(provider, registry, network).await?;
		Ok(Arc::new(signer))
	}

	async fn request_switch(
		&self,
		_provider: &dyn WalletProvider,
		_target: &NativeChainId,
	) -> Result<(), SignerError> {
		Err(SignerError::SwitchUnsupported(ChainFamily::Solana))
	}

	fn parse_chain_id(&self, raw: &str) -> Option<NativeChainId> {
		cluster_name(raw).map(|c| NativeChainId::Solana(c.to_string()))
	}
}
