//! Scripted in-process wallet.
//!
//! Answers the account, chain and send methods of both chain families from
//! local state and records every request it sees. Used for dry runs and by
//! tests that need to drive wallet behaviour (rejections, chain changes).

use crate::{ProviderEvent, SignerError, WalletProvider};
use async_trait::async_trait;
use bridge_types::{ChainFamily, ConfigSchema, Field, FieldType, Schema, ValidationError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Default)]
struct WalletState {
	accounts: Vec<String>,
	chain_id: String,
	requests: Vec<(String, Value)>,
	sent: usize,
	reject_after: Option<usize>,
	reject_switch: bool,
}

pub struct InMemoryWallet {
	family: ChainFamily,
	state: Mutex<WalletState>,
	events: broadcast::Sender<ProviderEvent>,
}

impl InMemoryWallet {
	pub fn new(family: ChainFamily, accounts: &[&str], chain_id: &str) -> Self {
		let (events, _) = broadcast::channel(16);
		Self {
			family,
			state: Mutex::new(WalletState {
				accounts: accounts.iter().map(|a| a.to_string()).collect(),
				chain_id: chain_id.to_string(),
				..Default::default()
			}),
			events,
		}
	}

	pub fn evm(accounts: &[&str], chain_id: &str) -> Self {
		Self::new(ChainFamily::Evm, accounts, chain_id)
	}

	pub fn solana(accounts: &[&str], cluster: &str) -> Self {
		Self::new(ChainFamily::Solana, accounts, cluster)
	}

	fn state(&self) -> MutexGuard<'_, WalletState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Changes the active chain without notifying subscribers.
	pub fn set_chain(&self, chain_id: &str) {
		self.state().chain_id = chain_id.to_string();
	}

	/// Changes the active chain the way a user would in the wallet UI.
	pub fn change_chain(&self, chain_id: &str) {
		self.set_chain(chain_id);
		let _ = self
			.events
			.send(ProviderEvent::ChainChanged(chain_id.to_string()));
	}

	pub fn set_accounts(&self, accounts: &[&str]) {
		let accounts: Vec<String> = accounts.iter().map(|a| a.to_string()).collect();
		self.state().accounts = accounts.clone();
		let _ = self.events.send(ProviderEvent::AccountsChanged(accounts));
	}

	/// Answers the next send requests with nothing once `count` have succeeded.
	pub fn reject_after(&self, count: usize) {
		let mut state = self.state();
		state.reject_after = Some(state.sent + count);
	}

	pub fn reject_switch(&self, reject: bool) {
		self.state().reject_switch = reject;
	}

	pub fn emit(&self, event: ProviderEvent) {
		let _ = self.events.send(event);
	}

	/// Every `(method, params)` pair received so far.
	pub fn requests(&self) -> Vec<(String, Value)> {
		self.state().requests.clone()
	}

	pub fn requests_for(&self, method: &str) -> Vec<Value> {
		self.state()
			.requests
			.iter()
			.filter(|(m, _)| m == method)
			.map(|(_, params)| params.clone())
			.collect()
	}

	fn send(&self) -> Value {
		let mut state = self.state();
		if state.reject_after.is_some_and(|limit| state.sent >= limit) {
			return Value::Null;
		}
		state.sent += 1;
		match self.family {
			ChainFamily::Evm => Value::String(format!("0x{:064x}", state.sent)),
			ChainFamily::Solana => json!({ "signature": format!("memsig{}", state.sent) }),
		}
	}

	fn switch(&self, params: &Value) -> Result<Value, SignerError> {
		let target = params
			.get(0)
			.and_then(|p| p.get("chainId"))
			.and_then(|c| c.as_str())
			.ok_or_else(|| SignerError::Provider("missing chainId".into()))?;
		if self.state().reject_switch {
			return Err(SignerError::Provider("User rejected the request".into()));
		}
		self.change_chain(target);
		Ok(Value::Null)
	}
}

#[async_trait]
impl WalletProvider for InMemoryWallet {
	async fn connect(&self) -> Result<(), SignerError> {
		Ok(())
	}

	async fn request(&self, method: &str, params: Value) -> Result<Value, SignerError> {
		debug!(method, "In-memory wallet request");
		self.state()
			.requests
			.push((method.to_string(), params.clone()));

		match method {
			"eth_requestAccounts" | "eth_accounts" | "solana_requestAccounts" => {
				Ok(json!(self.state().accounts))
			}
			"eth_chainId" | "solana_chainId" => {
				let chain_id = self.state().chain_id.clone();
				Ok(if chain_id.is_empty() {
					Value::Null
				} else {
					Value::String(chain_id)
				})
			}
			"eth_sendTransaction" | "solana_signAndSendTransaction" => Ok(self.send()),
			"wallet_switchEthereumChain" if self.family == ChainFamily::Evm => self.switch(&params),
			other => Err(SignerError::Provider(format!("Unsupported method: {}", other))),
		}
	}

	fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
		self.events.subscribe()
	}
}

pub struct InMemoryWalletSchema;

impl ConfigSchema for InMemoryWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("accounts", FieldType::Array(Box::new(FieldType::String))),
				Field::new("chain_id", FieldType::String),
			],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create an in-memory wallet from configuration.
///
/// Configuration parameters:
/// - `accounts`: accounts the wallet exposes, first one is used
/// - `chain_id`: active chain as the wallet reports it (`0xaa36a7`, `solana:devnet`)
pub fn create_wallet(
	config: &toml::Value,
	family: ChainFamily,
) -> Result<Arc<dyn WalletProvider>, SignerError> {
	InMemoryWalletSchema.validate(config)?;

	let accounts: Vec<&str> = config
		.get("accounts")
		.and_then(|v| v.as_array())
		.map(|items| items.iter().filter_map(|a| a.as_str()).collect())
		.unwrap_or_default();
	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_str())
		.unwrap_or_default();

	Ok(Arc::new(InMemoryWallet::new(family, &accounts, chain_id)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_switch_emits_chain_changed() {
		let wallet = InMemoryWallet::evm(&["0xaaa"], "0xaa36a7");
		let mut events = wallet.subscribe();

		wallet
			.request("wallet_switchEthereumChain", json!([{ "chainId": "0xa869" }]))
			.await
			.unwrap();

		assert_eq!(
			events.recv().await.unwrap(),
			ProviderEvent::ChainChanged("0xa869".into())
		);
		assert_eq!(
			wallet.request("eth_chainId", json!([])).await.unwrap(),
			"0xa869"
		);
	}

	#[tokio::test]
	async fn test_rejected_switch_keeps_chain() {
		let wallet = InMemoryWallet::evm(&["0xaaa"], "0xaa36a7");
		wallet.reject_switch(true);
		let result = wallet
			.request("wallet_switchEthereumChain", json!([{ "chainId": "0xa869" }]))
			.await;
		assert!(result.is_err());
		assert_eq!(
			wallet.request("eth_chainId", json!([])).await.unwrap(),
			"0xaa36a7"
		);
	}

	#[test]
	fn test_create_from_config() {
		let config: toml::Value =
			toml::from_str("accounts = [\"0xaaa\"]\nchain_id = \"0xaa36a7\"").unwrap();
		assert!(create_wallet(&config, ChainFamily::Evm).is_ok());

		let missing: toml::Value = toml::from_str("accounts = []").unwrap();
		assert!(matches!(
			create_wallet(&missing, ChainFamily::Evm),
			Err(SignerError::Config(_))
		));
	}
}
