//! Wallet backed by node-managed accounts over JSON-RPC.
//!
//! Development nodes (anvil, hardhat, geth --dev) keep unlocked accounts and
//! sign `eth_sendTransaction` themselves. This provider points at one node per
//! chain and treats `wallet_switchEthereumChain` as "use another node",
//! emitting the same `chainChanged` notification a browser wallet would.

use crate::implementations::evm::{encode_quantity, parse_quantity};
use crate::{ProviderEvent, SignerError, WalletProvider};
use async_trait::async_trait;
use bridge_types::{http_url, ChainFamily, ConfigSchema, Field, FieldType, Schema, ValidationError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct JsonRpcWallet {
	client: reqwest::Client,
	/// Node URL per EVM chain id.
	endpoints: HashMap<u64, String>,
	active: RwLock<u64>,
	next_id: AtomicU64,
	events: broadcast::Sender<ProviderEvent>,
}

impl JsonRpcWallet {
	pub fn new(
		endpoints: HashMap<u64, String>,
		active: u64,
		timeout: Duration,
	) -> Result<Self, SignerError> {
		if !endpoints.contains_key(&active) {
			return Err(SignerError::Config(format!(
				"no endpoint configured for active chain {}",
				active
			)));
		}
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| SignerError::Config(e.to_string()))?;
		let (events, _) = broadcast::channel(16);

		Ok(Self {
			client,
			endpoints,
			active: RwLock::new(active),
			next_id: AtomicU64::new(1),
			events,
		})
	}

	pub fn active_chain(&self) -> u64 {
		*self.active.read().unwrap_or_else(|e| e.into_inner())
	}

	fn active_endpoint(&self) -> Result<&str, SignerError> {
		let active = self.active_chain();
		self.endpoints
			.get(&active)
			.map(String::as_str)
			.ok_or_else(|| SignerError::Provider(format!("no endpoint for chain {}", active)))
	}

	async fn call(&self, url: &str, method: &str, params: Value) -> Result<Value, SignerError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});
		debug!(url, method, id, "JSON-RPC request");

		let response: Value = self
			.client
			.post(url)
			.json(&body)
			.send()
			.await
			.map_err(|e| SignerError::Provider(e.to_string()))?
			.json()
			.await
			.map_err(|e| SignerError::Provider(e.to_string()))?;

		if let Some(error) = response.get("error") {
			let message = error
				.get("message")
				.and_then(|m| m.as_str())
				.unwrap_or("unknown error");
			return Err(SignerError::Provider(format!(
				"{} (code {})",
				message,
				error.get("code").cloned().unwrap_or(Value::Null)
			)));
		}
		Ok(response.get("result").cloned().unwrap_or(Value::Null))
	}

	fn switch(&self, params: &Value) -> Result<Value, SignerError> {
		let raw = params
			.get(0)
			.and_then(|p| p.get("chainId"))
			.and_then(|c| c.as_str())
			.ok_or_else(|| SignerError::Provider("missing chainId".into()))?;
		let target = parse_quantity(raw)
			.ok_or_else(|| SignerError::Provider(format!("invalid chainId {}", raw)))?;
		if !self.endpoints.contains_key(&target) {
			return Err(SignerError::Provider(format!(
				"Unrecognized chain ID {} (code 4902)",
				raw
			)));
		}

		*self.active.write().unwrap_or_else(|e| e.into_inner()) = target;
		info!(chain_id = target, "Switched JSON-RPC wallet endpoint");
		let _ = self
			.events
			.send(ProviderEvent::ChainChanged(encode_quantity(target)));
		Ok(Value::Null)
	}
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
	async fn connect(&self) -> Result<(), SignerError> {
		let url = self.active_endpoint()?;
		let reported = self.call(url, "eth_chainId", json!([])).await?;
		let expected = self.active_chain();
		match reported.as_str().and_then(parse_quantity) {
			Some(id) if id == expected => {}
			other => warn!(
				expected,
				reported = ?other,
				url,
				"Node reports a different chain id than configured"
			),
		}
		Ok(())
	}

	async fn request(&self, method: &str, params: Value) -> Result<Value, SignerError> {
		match method {
			"wallet_switchEthereumChain" => self.switch(&params),
			// Node-managed accounts need no approval.
			"eth_requestAccounts" => {
				let url = self.active_endpoint()?;
				self.call(url, "eth_accounts", params).await
			}
			_ => {
				let url = self.active_endpoint()?;
				self.call(url, method, params).await
			}
		}
	}

	fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
		self.events.subscribe()
	}
}

pub struct JsonRpcWalletSchema;

impl ConfigSchema for JsonRpcWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("endpoints", FieldType::Table(Schema::default())),
			],
			vec![Field::new(
				"timeout_ms",
				FieldType::Integer {
					min: Some(100),
					max: None,
				},
			)],
		);
		schema.validate(config)?;

		if let Some(endpoints) = config.get("endpoints").and_then(|v| v.as_table()) {
			for (chain_id, url) in endpoints {
				let field = format!("endpoints.{}", chain_id);
				chain_id
					.parse::<u64>()
					.map_err(|_| ValidationError::InvalidValue {
						field: field.clone(),
						message: "key must be a numeric chain id".into(),
					})?;
				http_url(url).map_err(|message| ValidationError::InvalidValue { field, message })?;
			}
		}
		Ok(())
	}
}

/// Factory function to create a JSON-RPC wallet from configuration.
///
/// Configuration parameters:
/// - `chain_id`: chain the wallet starts on
/// - `endpoints`: table of `"<chain id>" = "<node url>"`
/// - `timeout_ms`: request timeout (default: 30000)
pub fn create_wallet(
	config: &toml::Value,
	family: ChainFamily,
) -> Result<Arc<dyn WalletProvider>, SignerError> {
	if family != ChainFamily::Evm {
		return Err(SignerError::Config(format!(
			"json-rpc wallet cannot serve {} chains",
			family
		)));
	}
	JsonRpcWalletSchema.validate(config)?;

	let active = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.unwrap_or_default() as u64;
	let endpoints = config
		.get("endpoints")
		.and_then(|v| v.as_table())
		.map(|table| {
			table
				.iter()
				.filter_map(|(id, url)| Some((id.parse().ok()?, url.as_str()?.to_string())))
				.collect()
		})
		.unwrap_or_default();
	let timeout = config
		.get("timeout_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(30_000) as u64;

	Ok(Arc::new(JsonRpcWallet::new(
		endpoints,
		active,
		Duration::from_millis(timeout),
	)?))
}
