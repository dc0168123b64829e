//! Wallet session: owns the current signer of one chain family.
//!
//! The session builds a signer when the wallet connects and rebuilds it every
//! time the wallet reports a chain or account change. Each rebuilt signer gets
//! a new generation number and the previous one is revoked, so anything still
//! holding it gets [`SignerError::Stale`] instead of submitting on the wrong
//! chain.
//!
//! Wallets show one prompt at a time, so every interaction with the provider
//! (signer construction, switch requests, sends) runs under a single lock.

use crate::{ProviderEvent, Signer, SignerError, WalletAdapter, WalletProvider};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bridge_registry::ChainRegistry;
use bridge_types::{
	BridgeEvent, Chain, ChainFamily, EventBus, Network, TxId, UnsignedTransaction, WalletEvent,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A signer together with the session generation it was built for.
pub struct BoundSigner {
	inner: Arc<dyn Signer>,
	generation: u64,
	revoked: AtomicBool,
	wallet: Arc<Mutex<()>>,
}

impl BoundSigner {
	fn new(inner: Arc<dyn Signer>, generation: u64, wallet: Arc<Mutex<()>>) -> Self {
		Self {
			inner,
			generation,
			revoked: AtomicBool::new(false),
			wallet,
		}
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	pub fn is_revoked(&self) -> bool {
		self.revoked.load(Ordering::Acquire)
	}

	fn revoke(&self) {
		self.revoked.store(true, Ordering::Release);
	}
}

#[async_trait]
impl Signer for BoundSigner {
	fn chain(&self) -> &Chain {
		self.inner.chain()
	}

	fn address(&self) -> &str {
		self.inner.address()
	}

	async fn sign_and_send(
		&self,
		transactions: Vec<UnsignedTransaction>,
	) -> Result<Vec<TxId>, SignerError> {
		let _wallet = self.wallet.lock().await;
		// Checked under the lock: a rebuild that ran while we waited revoked us.
		if self.is_revoked() {
			return Err(SignerError::Stale);
		}
		self.inner.sign_and_send(transactions).await
	}
}

/// Where the orchestrator gets signers from.
///
/// Implementations must hand out the signer for the wallet's current state;
/// callers fetch a fresh one per operation instead of caching it.
#[async_trait]
pub trait SignerSource: Send + Sync {
	fn current_signer(&self) -> Option<Arc<dyn Signer>>;

	/// Asks the wallet to move to `chain` and returns the signer bound to it.
	async fn switch_to(&self, chain: &Chain) -> Result<Arc<dyn Signer>, SignerError>;
}

pub struct WalletSession {
	provider: Arc<dyn WalletProvider>,
	adapter: Arc<dyn WalletAdapter>,
	registry: Arc<ChainRegistry>,
	network: Network,
	current: ArcSwapOption<BoundSigner>,
	generation: AtomicU64,
	/// Held for every provider interaction, including sends through a
	/// [`BoundSigner`] handed out by this session.
	wallet: Arc<Mutex<()>>,
	events: EventBus,
}

impl WalletSession {
	pub fn new(
		provider: Arc<dyn WalletProvider>,
		adapter: Arc<dyn WalletAdapter>,
		registry: Arc<ChainRegistry>,
		network: Network,
		events: EventBus,
	) -> Self {
		Self {
			provider,
			adapter,
			registry,
			network,
			current: ArcSwapOption::empty(),
			generation: AtomicU64::new(0),
			wallet: Arc::new(Mutex::new(())),
			events,
		}
	}

	pub fn family(&self) -> ChainFamily {
		self.adapter.family()
	}

	pub fn network(&self) -> Network {
		self.network
	}

	pub fn provider(&self) -> &Arc<dyn WalletProvider> {
		&self.provider
	}

	/// Connects the provider and builds the first signer.
	pub async fn connect(&self) -> Result<Arc<dyn Signer>, SignerError> {
		let _wallet = self.wallet.lock().await;
		if let Err(e) = self.provider.connect().await {
			self.clear(e.to_string());
			return Err(e);
		}
		self.rebuild().await.map(|s| s as Arc<dyn Signer>)
	}

	/// Revokes the current signer and builds a new one from the wallet's state.
	///
	/// On failure the session is left without a signer.
	pub async fn refresh(&self) -> Result<Arc<dyn Signer>, SignerError> {
		let _wallet = self.wallet.lock().await;
		self.rebuild().await.map(|s| s as Arc<dyn Signer>)
	}

	/// Caller holds the wallet lock.
	async fn rebuild(&self) -> Result<Arc<BoundSigner>, SignerError> {
		self.revoke_current();

		let family = self.family();
		let built = self
			.adapter
			.signer_from_provider(self.provider.clone(), &self.registry, self.network)
			.await;

		match built {
			Ok(signer) => {
				let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
				let bound = Arc::new(BoundSigner::new(signer, generation, self.wallet.clone()));
				info!(
					%family,
					chain = %bound.chain(),
					address = bound.address(),
					generation,
					"Wallet signer ready"
				);
				self.current.store(Some(bound.clone()));
				self.events.publish(BridgeEvent::Wallet(WalletEvent::Connected {
					family,
					chain: bound.chain().clone(),
					address: bound.address().to_string(),
					generation,
				}))
				.ok();
				Ok(bound)
			}
			Err(e) => {
				warn!(%family, error = %e, "Could not build wallet signer");
				self.events.publish(BridgeEvent::Wallet(WalletEvent::Disconnected {
					family,
					reason: e.to_string(),
				}))
				.ok();
				Err(e)
			}
		}
	}

	fn revoke_current(&self) {
		if let Some(old) = self.current.swap(None) {
			debug!(generation = old.generation(), "Revoking wallet signer");
			old.revoke();
		}
	}

	fn clear(&self, reason: String) {
		self.revoke_current();
		self.events.publish(BridgeEvent::Wallet(WalletEvent::Disconnected {
			family: self.family(),
			reason,
		}))
		.ok();
	}

	pub fn current(&self) -> Option<Arc<BoundSigner>> {
		self.current.load_full()
	}

	/// Generation of the current signer, 0 if none was ever built.
	pub fn generation(&self) -> u64 {
		self.current
			.load()
			.as_ref()
			.map(|s| s.generation())
			.unwrap_or(0)
	}

	pub fn is_current(&self, generation: u64) -> bool {
		self.current
			.load()
			.as_ref()
			.is_some_and(|s| s.generation() == generation)
	}

	/// Applies one provider notification.
	pub async fn handle_event(&self, event: ProviderEvent) {
		match event {
			ProviderEvent::ChainChanged(raw) => {
				self.events.publish(BridgeEvent::Wallet(WalletEvent::ChainChanged {
					family: self.family(),
					native_chain_id: raw.clone(),
				}))
				.ok();
				// A switch requested through this session notifies too; by the
				// time the lock is ours its signer is already in place.
				let _wallet = self.wallet.lock().await;
				if self.bound_to(&raw) {
					debug!(chain_id = %raw, "Signer already bound to reported chain");
					return;
				}
				info!(chain_id = %raw, "Wallet chain changed");
				let _ = self.rebuild().await;
			}
			ProviderEvent::AccountsChanged(accounts) => {
				info!(accounts = accounts.len(), "Wallet accounts changed");
				let _ = self.refresh().await;
			}
			ProviderEvent::Disconnected => {
				info!(family = %self.family(), "Wallet disconnected");
				self.clear("wallet disconnected".into());
			}
		}
	}

	/// Whether the live signer already sits on the chain a notification reports.
	fn bound_to(&self, raw: &str) -> bool {
		let Some(current) = self.current() else {
			return false;
		};
		let Some(reported) = self.adapter.parse_chain_id(raw) else {
			return false;
		};
		self.registry
			.native_id(self.network, current.chain())
			.is_ok_and(|native| native == reported)
	}

	/// Spawns the task that keeps the signer in sync with provider events.
	pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
		let session = Arc::clone(self);
		let mut events = session.provider.subscribe();
		tokio::spawn(async move {
			loop {
				match events.recv().await {
					Ok(event) => session.handle_event(event).await,
					Err(RecvError::Lagged(skipped)) => {
						warn!(skipped, "Missed wallet notifications, rebuilding signer");
						let _ = session.refresh().await;
					}
					Err(RecvError::Closed) => break,
				}
			}
		})
	}
}

#[async_trait]
impl SignerSource for WalletSession {
	fn current_signer(&self) -> Option<Arc<dyn Signer>> {
		self.current().map(|s| s as Arc<dyn Signer>)
	}

	async fn switch_to(&self, chain: &Chain) -> Result<Arc<dyn Signer>, SignerError> {
		let _wallet = self.wallet.lock().await;
		if let Some(current) = self.current() {
			if current.chain() == chain {
				return Ok(current as Arc<dyn Signer>);
			}
		}

		let target = self.registry.native_id(self.network, chain)?;
		if target.family() != self.family() {
			return Err(SignerError::WrongFamily {
				chain: chain.clone(),
				family: self.family(),
			});
		}

		self.adapter
			.request_switch(self.provider.as_ref(), &target)
			.await?;
		let signer = self.rebuild().await?;
		if signer.chain() != chain {
			return Err(SignerError::ChainMismatch {
				expected: chain.clone(),
				actual: signer.chain().clone(),
			});
		}
		Ok(signer as Arc<dyn Signer>)
	}
}
