//! Cross-chain transfer orchestration.
//!
//! [`BridgeBuilder`] wires the configured wallet providers, chain platform
//! and storage into a [`BridgeEngine`]. The engine owns one
//! [`WalletSession`] per chain family and hands out a
//! [`TransferOrchestrator`] per transfer.

use bridge_config::Config;
use bridge_platform::{PlatformError, PlatformInterface, PlatformService};
use bridge_registry::ChainRegistry;
use bridge_signer::{adapter_for, Signer, SignerError, WalletProvider, WalletSession};
use bridge_storage::{StorageError, StorageInterface, StorageService, TRANSFERS};
use bridge_types::{Chain, ChainFamily, EventBus, Network, TransferSnapshot};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod error;
pub mod orchestrator;

pub use error::{EngineError, FailureKind, TransferError};
pub use orchestrator::{TransferOrchestrator, TransferRequest, TransferSettings};

pub struct BridgeEngine {
	config: Config,
	registry: Arc<ChainRegistry>,
	sessions: HashMap<ChainFamily, Arc<WalletSession>>,
	platform: Arc<PlatformService>,
	storage: Arc<StorageService>,
	events: EventBus,
	settings: TransferSettings,
}

impl BridgeEngine {
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn network(&self) -> Network {
		self.config.bridge.network
	}

	pub fn registry(&self) -> &Arc<ChainRegistry> {
		&self.registry
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.events
	}

	pub fn session(&self, family: ChainFamily) -> Option<Arc<WalletSession>> {
		self.sessions.get(&family).cloned()
	}

	/// Session of the wallet that signs for `chain`.
	pub fn session_for(&self, chain: &Chain) -> Result<Arc<WalletSession>, TransferError> {
		let family = self
			.registry
			.family(self.network(), chain)
			.ok_or_else(|| TransferError::NoPlatform(chain.clone()))?;
		self.session(family).ok_or(TransferError::NoSigner)
	}

	/// Connects every configured wallet.
	///
	/// A wallet that fails to connect is left without a signer; the error is
	/// returned per family so the caller can report it.
	pub async fn connect(&self) -> Vec<(ChainFamily, Result<Arc<dyn Signer>, SignerError>)> {
		let connections = self.sessions.iter().map(|(family, session)| async move {
			let result = session.connect().await;
			match &result {
				Ok(signer) => info!(%family, chain = %signer.chain(), "Wallet connected"),
				Err(e) => warn!(%family, error = %e, "Wallet connection failed"),
			}
			(*family, result)
		});
		join_all(connections).await
	}

	/// Starts one task per session that follows wallet notifications.
	pub fn spawn_listeners(&self) -> Vec<JoinHandle<()>> {
		self.sessions
			.values()
			.map(|session| session.spawn_listener())
			.collect()
	}

	pub fn new_transfer(&self) -> TransferOrchestrator {
		TransferOrchestrator::new(
			self.platform.clone(),
			self.storage.clone(),
			self.events.clone(),
			self.settings.clone(),
		)
	}

	/// Loads a stored transfer and rebuilds its state machine.
	pub async fn resume(&self, transfer_id: &str) -> Result<TransferOrchestrator, TransferError> {
		let snapshot: TransferSnapshot = self.storage.retrieve(TRANSFERS, transfer_id).await?;
		info!(transfer_id, state = %snapshot.state, "Resuming transfer");
		Ok(TransferOrchestrator::resume(
			self.platform.clone(),
			self.storage.clone(),
			self.events.clone(),
			self.settings.clone(),
			snapshot,
		))
	}

	/// Stored snapshot of a transfer.
	pub async fn snapshot(&self, transfer_id: &str) -> Result<TransferSnapshot, TransferError> {
		Ok(self.storage.retrieve(TRANSFERS, transfer_id).await?)
	}

	/// Ids of every stored transfer.
	pub async fn transfers(&self) -> Result<Vec<String>, StorageError> {
		self.storage.list(TRANSFERS).await
	}
}

// Type aliases for factory functions
type WalletFactory = Box<
	dyn Fn(&toml::Value, ChainFamily) -> Result<Arc<dyn WalletProvider>, SignerError> + Send,
>;
type PlatformFactory = Box<
	dyn Fn(
			&toml::Value,
			Arc<ChainRegistry>,
			Network,
		) -> Result<Box<dyn PlatformInterface>, PlatformError>
		+ Send,
>;
type StorageFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send>;

/// Builds a [`BridgeEngine`] from configuration and named backend factories.
pub struct BridgeBuilder {
	config: Config,
	wallet_factories: HashMap<String, WalletFactory>,
	platform_factories: HashMap<String, PlatformFactory>,
	storage_factories: HashMap<String, StorageFactory>,
}

impl BridgeBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			wallet_factories: HashMap::new(),
			platform_factories: HashMap::new(),
			storage_factories: HashMap::new(),
		}
	}

	pub fn with_wallet_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value, ChainFamily) -> Result<Arc<dyn WalletProvider>, SignerError>
			+ Send
			+ 'static,
	{
		self.wallet_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_platform_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(
				&toml::Value,
				Arc<ChainRegistry>,
				Network,
			) -> Result<Box<dyn PlatformInterface>, PlatformError>
			+ Send
			+ 'static,
	{
		self.platform_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_storage_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send + 'static,
	{
		self.storage_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn build(self) -> Result<BridgeEngine, EngineError> {
		let network = self.config.bridge.network;
		let registry = Arc::new(self.config.registry.build()?);
		let events = EventBus::new(self.config.bridge.event_capacity);

		// Create storage backend
		let storage_config = &self.config.storage;
		let storage_factory = self
			.storage_factories
			.get(&storage_config.backend)
			.ok_or_else(|| {
				EngineError::Config(format!("Unknown storage backend: {}", storage_config.backend))
			})?;
		let storage = Arc::new(StorageService::new(storage_factory(&storage_config.config)?));

		// Create platform
		let platform_config = &self.config.platform;
		let platform_factory = self
			.platform_factories
			.get(&platform_config.implementation)
			.ok_or_else(|| {
				EngineError::Config(format!(
					"Unknown platform implementation: {}",
					platform_config.implementation
				))
			})?;
		let platform = Arc::new(PlatformService::new(platform_factory(
			&platform_config.config,
			registry.clone(),
			network,
		)?));

		// One provider and session per chain family
		let mut sessions = HashMap::new();
		for (family, wallet) in &self.config.wallets {
			let factory = self.wallet_factories.get(&wallet.backend).ok_or_else(|| {
				EngineError::Config(format!("Unknown wallet backend for {}: {}", family, wallet.backend))
			})?;
			let provider = factory(&wallet.config, *family)?;
			let session = WalletSession::new(
				provider,
				adapter_for(*family),
				registry.clone(),
				network,
				events.clone(),
			);
			sessions.insert(*family, Arc::new(session));
		}
		if sessions.is_empty() {
			return Err(EngineError::Config("No wallets configured".into()));
		}

		let settings = TransferSettings {
			amount: self.config.bridge.amount.clone(),
			attestation_timeout: self.config.bridge.attestation_timeout(),
		};

		info!(
			%network,
			wallets = sessions.len(),
			platform = %platform_config.implementation,
			storage = %storage_config.backend,
			"Bridge engine built"
		);

		Ok(BridgeEngine {
			config: self.config,
			registry,
			sessions,
			platform,
			storage,
			events,
			settings,
		})
	}
}
