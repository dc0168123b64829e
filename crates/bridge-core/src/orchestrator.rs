//! Transfer state machine.
//!
//! One [`TransferOrchestrator`] drives one transfer through
//! `Idle → Built → Initiated → AttestationPending → Attested → Completed`.
//! Each phase is an explicit async call that either advances the state or
//! leaves it where it was and returns a [`TransferError`]. Signers are fetched
//! from a [`SignerSource`] at the start of every phase and never cached, so a
//! wallet change between phases is always observed.
//!
//! After every transition the snapshot is written to storage under
//! `transfers:<id>` and a [`TransferEvent`] is published.

use crate::error::TransferError;
use arc_swap::ArcSwap;
use bridge_platform::{PlatformError, PlatformService};
use bridge_signer::{Signer, SignerError, SignerSource};
use bridge_storage::{StorageService, TRANSFERS};
use bridge_types::{
	Amount, AttestationId, BridgeEvent, ChainAddress, EventBus, TokenAddress, TokenId,
	TokenTransfer, TransferDetails, TransferEvent, TransferSnapshot, TransferState, TxId,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// Defaults applied to every transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
	/// Amount used when a request does not carry one.
	pub amount: String,
	pub attestation_timeout: Duration,
}

impl Default for TransferSettings {
	fn default() -> Self {
		Self {
			amount: "0.01".to_string(),
			attestation_timeout: Duration::from_secs(60),
		}
	}
}

/// What the user asked to move. The source is whatever the signer is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
	pub to: ChainAddress,
	pub token: TokenAddress,
	/// Decimal amount; `None` uses [`TransferSettings::amount`].
	pub amount: Option<String>,
	pub automatic: bool,
}

impl TransferRequest {
	/// Transfer of the source chain's native token.
	pub fn native(to: ChainAddress) -> Self {
		Self {
			to,
			token: TokenAddress::Native,
			amount: None,
			automatic: false,
		}
	}

	pub fn with_token(mut self, contract: impl Into<String>) -> Self {
		self.token = TokenAddress::Contract(contract.into());
		self
	}

	pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
		self.amount = Some(amount.into());
		self
	}
}

pub struct TransferOrchestrator {
	platform: Arc<PlatformService>,
	storage: Arc<StorageService>,
	events: EventBus,
	settings: TransferSettings,
	snapshot: ArcSwap<TransferSnapshot>,
	/// Held for the duration of a phase operation.
	phase: Mutex<()>,
}

impl TransferOrchestrator {
	pub fn new(
		platform: Arc<PlatformService>,
		storage: Arc<StorageService>,
		events: EventBus,
		settings: TransferSettings,
	) -> Self {
		Self::resume(platform, storage, events, settings, TransferSnapshot::idle())
	}

	/// Rebuilds the machine from a stored snapshot.
	pub fn resume(
		platform: Arc<PlatformService>,
		storage: Arc<StorageService>,
		events: EventBus,
		settings: TransferSettings,
		snapshot: TransferSnapshot,
	) -> Self {
		Self {
			platform,
			storage,
			events,
			settings,
			snapshot: ArcSwap::from_pointee(snapshot),
			phase: Mutex::new(()),
		}
	}

	pub fn snapshot(&self) -> TransferSnapshot {
		self.snapshot.load().as_ref().clone()
	}

	pub fn state(&self) -> TransferState {
		self.snapshot.load().state
	}

	pub fn transfer_id(&self) -> Option<String> {
		self.snapshot.load().transfer_id().map(str::to_string)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
		self.events.subscribe()
	}

	/// `Idle → Built`: materializes the transfer from the source signer.
	pub async fn build_transfer(
		&self,
		source: &dyn SignerSource,
		request: TransferRequest,
	) -> Result<TransferSnapshot, TransferError> {
		let _phase = self.phase.try_lock().map_err(|_| TransferError::Busy)?;
		let result = self.build(source, request).await;
		self.settle("build", result).await
	}

	/// `Built → Initiated`: submits the source transactions.
	///
	/// On failure the transfer stays `Built`; ids of transactions the wallet
	/// already accepted are available through [`TransferError::submitted`].
	pub async fn initiate_transfer(
		&self,
		source: &dyn SignerSource,
	) -> Result<Vec<TxId>, TransferError> {
		let _phase = self.phase.try_lock().map_err(|_| TransferError::Busy)?;
		let result = self.initiate(source).await;
		self.settle("initiate", result).await
	}

	/// `Initiated → AttestationPending → Attested`: waits for attestations.
	///
	/// Blocks for at most `timeout` (the configured default when `None`).
	/// Returns every attestation recorded so far. The transfer only becomes
	/// `Attested` once the platform's required number is reached; until then
	/// it stays `AttestationPending` and the call can be repeated.
	pub async fn fetch_attestation(
		&self,
		timeout: Option<Duration>,
	) -> Result<Vec<AttestationId>, TransferError> {
		let _phase = self.phase.try_lock().map_err(|_| TransferError::Busy)?;
		let timeout = timeout.unwrap_or(self.settings.attestation_timeout);
		let result = self.attest(timeout).await;
		self.settle("fetch attestation for", result).await
	}

	/// `Attested → Completed`: redeems the transfer on the destination chain.
	///
	/// A signer bound to another chain is switched to the destination first.
	pub async fn complete_transfer(
		&self,
		source: &dyn SignerSource,
	) -> Result<Vec<TxId>, TransferError> {
		let _phase = self.phase.try_lock().map_err(|_| TransferError::Busy)?;
		let result = self.complete(source).await;
		self.settle("complete", result).await
	}

	/// Moves a non-terminal transfer to `Failed`.
	pub async fn abandon(&self, reason: &str) -> Result<TransferSnapshot, TransferError> {
		let _phase = self.phase.try_lock().map_err(|_| TransferError::Busy)?;
		let current = self.snapshot.load_full();
		if current.state.is_terminal() {
			return Err(TransferError::InvalidState {
				state: current.state,
				operation: "abandon",
			});
		}

		let snapshot = TransferSnapshot {
			state: TransferState::Failed,
			transfer: current.transfer.clone(),
			last_error: Some(reason.to_string()),
			submitted_txids: current.submitted_txids.clone(),
			updated_at: Utc::now(),
		};
		info!(transfer_id = ?snapshot.transfer_id(), reason, "Transfer abandoned");
		self.store(snapshot.clone()).await;
		self.events
			.publish(BridgeEvent::Transfer(TransferEvent::Abandoned {
				transfer_id: snapshot.transfer_id().map(str::to_string),
				reason: reason.to_string(),
			}))
			.ok();
		Ok(snapshot)
	}

	async fn build(
		&self,
		source: &dyn SignerSource,
		request: TransferRequest,
	) -> Result<TransferSnapshot, TransferError> {
		self.check_state(&[TransferState::Idle], "build")?;
		let signer = source.current_signer().ok_or(TransferError::NoSigner)?;
		let from = signer.chain_address();

		self.platform
			.chain_context(&from.chain)
			.map_err(|_| TransferError::NoPlatform(from.chain.clone()))?;

		let token = TokenId {
			chain: from.chain.clone(),
			address: request.token,
		};
		let decimals = self
			.platform
			.token_decimals(&token)
			.await
			.map_err(platform_error)?;
		let amount_text = request.amount.as_deref().unwrap_or(&self.settings.amount);
		let amount = Amount::parse(amount_text, decimals)?;

		let details = TransferDetails {
			from,
			to: request.to,
			token,
			amount,
			automatic: request.automatic,
		};
		let transfer = self
			.platform
			.create_transfer(details)
			.await
			.map_err(platform_error)?;

		info!(
			transfer_id = %transfer.id,
			from = %transfer.details.from,
			to = %transfer.details.to,
			amount = %transfer.details.amount,
			"Transfer built"
		);
		let event = TransferEvent::Built {
			transfer_id: transfer.id.clone(),
		};
		Ok(self.commit(TransferState::Built, transfer, event).await)
	}

	async fn initiate(&self, source: &dyn SignerSource) -> Result<Vec<TxId>, TransferError> {
		let mut transfer = self.expect_state(&[TransferState::Built], "initiate")?;
		let signer = source.current_signer().ok_or(TransferError::NoSigner)?;
		if signer.chain() != &transfer.details.from.chain {
			return Err(TransferError::InitiationFailed(PlatformError::Signer(
				SignerError::ChainMismatch {
					expected: transfer.details.from.chain.clone(),
					actual: signer.chain().clone(),
				},
			)));
		}

		let txids = self
			.platform
			.initiate_transfer(&transfer, signer.as_ref())
			.await
			.map_err(TransferError::InitiationFailed)?;
		if txids.is_empty() || txids.iter().any(|id| id.as_str().is_empty()) {
			return Err(TransferError::InitiationFailed(no_txid()));
		}

		for txid in &txids {
			info!(transfer_id = %transfer.id, txid = %txid, "Source transaction submitted");
		}
		transfer.source_txids = txids.clone();
		let event = TransferEvent::Initiated {
			transfer_id: transfer.id.clone(),
			txids: txids.clone(),
		};
		self.commit(TransferState::Initiated, transfer, event).await;
		Ok(txids)
	}

	async fn attest(&self, timeout: Duration) -> Result<Vec<AttestationId>, TransferError> {
		let current = self.snapshot.load_full();
		let mut transfer = self.expect_state(
			&[TransferState::Initiated, TransferState::AttestationPending],
			"fetch attestation for",
		)?;
		if transfer.source_txids.is_empty() {
			return Err(TransferError::InvalidState {
				state: current.state,
				operation: "fetch attestation for",
			});
		}

		if current.state == TransferState::Initiated {
			let event = TransferEvent::AttestationPending {
				transfer_id: transfer.id.clone(),
			};
			self.commit(TransferState::AttestationPending, transfer.clone(), event)
				.await;
		}

		let fetched = self
			.platform
			.fetch_attestation(&transfer, timeout)
			.await
			.map_err(|e| match e {
				PlatformError::AttestationTimeout(waited) => TransferError::AttestationTimeout(waited),
				other => TransferError::Platform(other),
			})?;

		for attestation in fetched {
			if attestation.emitter.is_empty() {
				warn!(transfer_id = %transfer.id, "Ignoring attestation without emitter");
				continue;
			}
			if !transfer.attestations.contains(&attestation) {
				debug!(transfer_id = %transfer.id, attestation = %attestation, "Attestation observed");
				transfer.attestations.push(attestation);
			}
		}
		if transfer.attestations.is_empty() {
			return Err(TransferError::AttestationTimeout(timeout));
		}

		let required = self.platform.required_attestations(&transfer);
		let attestations = transfer.attestations.clone();
		if attestations.len() >= required {
			info!(
				transfer_id = %transfer.id,
				attestations = attestations.len(),
				"Transfer attested"
			);
			let event = TransferEvent::Attested {
				transfer_id: transfer.id.clone(),
				attestations: attestations.clone(),
			};
			self.commit(TransferState::Attested, transfer, event).await;
		} else {
			info!(
				transfer_id = %transfer.id,
				received = attestations.len(),
				required,
				"Waiting for more attestations"
			);
			let event = TransferEvent::AttestationPending {
				transfer_id: transfer.id.clone(),
			};
			self.commit(TransferState::AttestationPending, transfer, event)
				.await;
		}
		Ok(attestations)
	}

	async fn complete(&self, source: &dyn SignerSource) -> Result<Vec<TxId>, TransferError> {
		let mut transfer = self.expect_state(&[TransferState::Attested], "complete")?;
		if transfer.attestations.is_empty() {
			return Err(TransferError::InvalidState {
				state: TransferState::Attested,
				operation: "complete",
			});
		}

		let destination = transfer.details.to.chain.clone();
		let signer = match source.current_signer() {
			None => return Err(TransferError::NoSigner),
			Some(signer) if signer.chain() == &destination => signer,
			Some(signer) => {
				info!(
					transfer_id = %transfer.id,
					from = %signer.chain(),
					to = %destination,
					"Switching wallet to destination chain"
				);
				source.switch_to(&destination).await?
			}
		};

		let txids = self
			.platform
			.complete_transfer(&transfer, signer.as_ref())
			.await
			.map_err(TransferError::CompletionFailed)?;
		if txids.is_empty() || txids.iter().any(|id| id.as_str().is_empty()) {
			return Err(TransferError::CompletionFailed(no_txid()));
		}

		for txid in &txids {
			info!(transfer_id = %transfer.id, txid = %txid, "Destination transaction submitted");
		}
		transfer.destination_txids = txids.clone();
		let event = TransferEvent::Completed {
			transfer_id: transfer.id.clone(),
			txids: txids.clone(),
		};
		self.commit(TransferState::Completed, transfer, event).await;
		Ok(txids)
	}

	fn check_state(
		&self,
		allowed: &[TransferState],
		operation: &'static str,
	) -> Result<Arc<TransferSnapshot>, TransferError> {
		let current = self.snapshot.load_full();
		if !allowed.contains(&current.state) {
			return Err(TransferError::InvalidState {
				state: current.state,
				operation,
			});
		}
		Ok(current)
	}

	/// The current transfer, if the machine is in one of `allowed`.
	fn expect_state(
		&self,
		allowed: &[TransferState],
		operation: &'static str,
	) -> Result<TokenTransfer, TransferError> {
		let current = self.check_state(allowed, operation)?;
		current
			.transfer
			.clone()
			.ok_or(TransferError::InvalidState {
				state: current.state,
				operation,
			})
	}

	async fn commit(
		&self,
		state: TransferState,
		transfer: TokenTransfer,
		event: TransferEvent,
	) -> TransferSnapshot {
		let snapshot = TransferSnapshot {
			state,
			transfer: Some(transfer),
			last_error: None,
			submitted_txids: self.snapshot.load().submitted_txids.clone(),
			updated_at: Utc::now(),
		};
		self.store(snapshot.clone()).await;
		self.events.publish(BridgeEvent::Transfer(event)).ok();
		snapshot
	}

	async fn settle<T>(
		&self,
		operation: &'static str,
		result: Result<T, TransferError>,
	) -> Result<T, TransferError> {
		if let Err(e) = &result {
			let current = self.snapshot.load_full();
			warn!(
				transfer_id = ?current.transfer_id(),
				state = %current.state,
				kind = ?e.kind(),
				error = %e,
				"Failed to {} transfer",
				operation
			);
			let mut snapshot = TransferSnapshot {
				last_error: Some(e.to_string()),
				updated_at: Utc::now(),
				..current.as_ref().clone()
			};
			for txid in e.submitted() {
				warn!(txid = %txid, "Source transaction submitted before rejection");
				snapshot.submitted_txids.push(txid.clone());
			}
			self.store(snapshot).await;
			self.events
				.publish(BridgeEvent::Transfer(TransferEvent::PhaseFailed {
					transfer_id: current.transfer_id().map(str::to_string),
					state: current.state,
					error: e.to_string(),
				}))
				.ok();
		}
		result
	}

	/// Swaps in `snapshot` and persists it. A storage failure is logged and
	/// does not undo the transition.
	async fn store(&self, snapshot: TransferSnapshot) {
		if let Some(id) = snapshot.transfer_id() {
			if let Err(e) = self.storage.store(TRANSFERS, id, &snapshot).await {
				error!(transfer_id = %id, error = %e, "Failed to persist transfer snapshot");
			}
		}
		self.snapshot.store(Arc::new(snapshot));
	}
}

fn platform_error(err: PlatformError) -> TransferError {
	match err {
		PlatformError::UnsupportedChain(chain) => TransferError::NoPlatform(chain),
		other => TransferError::Platform(other),
	}
}

fn no_txid() -> PlatformError {
	PlatformError::Signer(SignerError::SignRejected {
		collected: Vec::new(),
		reason: "wallet returned no transaction id".into(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::FailureKind;
	use bridge_platform::implementations::simulated::SimulatedPlatform;
	use bridge_registry::ChainRegistry;
	use bridge_signer::implementations::memory::InMemoryWallet;
	use bridge_signer::{adapter_for, WalletSession};
	use bridge_storage::implementations::memory::MemoryStorage;
	use bridge_types::{Chain, ChainEntry, ChainFamily, NativeChainId, Network, U256};

	const SEPOLIA: &str = "0xaa36a7";
	const AVALANCHE_FUJI: &str = "0xa869";
	const ACCOUNT: &str = "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1";
	const USDC: &str = "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238";

	struct Fixture {
		wallet: Arc<InMemoryWallet>,
		session: Arc<WalletSession>,
		platform: Arc<PlatformService>,
		storage: Arc<StorageService>,
		events: EventBus,
	}

	impl Fixture {
		fn new(platform: SimulatedPlatform) -> Self {
			let wallet = Arc::new(InMemoryWallet::evm(&[ACCOUNT], SEPOLIA));
			let events = EventBus::new(256);
			let session = Arc::new(WalletSession::new(
				wallet.clone(),
				adapter_for(ChainFamily::Evm),
				registry(),
				Network::Testnet,
				events.clone(),
			));
			Self {
				wallet,
				session,
				platform: Arc::new(PlatformService::new(Box::new(platform))),
				storage: Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
				events,
			}
		}

		async fn connected(platform: SimulatedPlatform) -> Self {
			let fixture = Self::new(platform);
			fixture.session.connect().await.unwrap();
			fixture
		}

		fn orchestrator(&self) -> TransferOrchestrator {
			TransferOrchestrator::new(
				self.platform.clone(),
				self.storage.clone(),
				self.events.clone(),
				TransferSettings::default(),
			)
		}

		fn sends(&self) -> usize {
			self.wallet.requests_for("eth_sendTransaction").len()
		}

		/// Builds and initiates a transfer to Avalanche.
		async fn initiated(&self, orchestrator: &TransferOrchestrator) {
			orchestrator
				.build_transfer(self.session.as_ref(), to_avalanche())
				.await
				.unwrap();
			orchestrator
				.initiate_transfer(self.session.as_ref())
				.await
				.unwrap();
		}
	}

	fn registry() -> Arc<ChainRegistry> {
		Arc::new(ChainRegistry::with_defaults())
	}

	fn simulated() -> SimulatedPlatform {
		SimulatedPlatform::new(registry(), Network::Testnet)
	}

	fn to_avalanche() -> TransferRequest {
		TransferRequest::native(ChainAddress::new(Chain::new("Avalanche"), ACCOUNT))
	}

	fn transfer_events(rx: &mut broadcast::Receiver<BridgeEvent>) -> Vec<&'static str> {
		let mut names = Vec::new();
		while let Ok(event) = rx.try_recv() {
			if let BridgeEvent::Transfer(event) = event {
				names.push(match event {
					TransferEvent::Built { .. } => "built",
					TransferEvent::Initiated { .. } => "initiated",
					TransferEvent::AttestationPending { .. } => "pending",
					TransferEvent::Attested { .. } => "attested",
					TransferEvent::Completed { .. } => "completed",
					TransferEvent::PhaseFailed { .. } => "failed",
					TransferEvent::Abandoned { .. } => "abandoned",
				});
			}
		}
		names
	}

	#[tokio::test]
	async fn test_native_transfer_happy_path() {
		let f = Fixture::connected(simulated()).await;
		let orchestrator = f.orchestrator();
		let mut events = orchestrator.subscribe();

		let built = orchestrator
			.build_transfer(f.session.as_ref(), to_avalanche())
			.await
			.unwrap();
		assert_eq!(built.state, TransferState::Built);
		let details = built.transfer.unwrap().details;
		assert_eq!(details.from, ChainAddress::new(Chain::new("Sepolia"), ACCOUNT));
		assert_eq!(details.token, TokenId::native(Chain::new("Sepolia")));
		assert_eq!(details.amount.decimals, 18);
		assert_eq!(details.amount.units, U256::from(10_000_000_000_000_000u64));

		let source = orchestrator
			.initiate_transfer(f.session.as_ref())
			.await
			.unwrap();
		assert_eq!(source.len(), 1);
		assert_eq!(orchestrator.state(), TransferState::Initiated);

		let attestations = orchestrator
			.fetch_attestation(Some(Duration::from_millis(60_000)))
			.await
			.unwrap();
		assert_eq!(attestations.len(), 1);
		assert_eq!(attestations[0].chain, Chain::new("Sepolia"));
		assert!(!attestations[0].emitter.is_empty());
		assert_eq!(orchestrator.state(), TransferState::Attested);

		let destination = orchestrator
			.complete_transfer(f.session.as_ref())
			.await
			.unwrap();
		assert_eq!(destination.len(), 1);
		assert_eq!(orchestrator.state(), TransferState::Completed);

		// The wallet was asked to switch once and the session followed.
		assert_eq!(f.wallet.requests_for("wallet_switchEthereumChain").len(), 1);
		assert_eq!(
			f.session.current().unwrap().chain(),
			&Chain::new("Avalanche")
		);
		assert_eq!(f.sends(), 2);

		let id = orchestrator.transfer_id().unwrap();
		let stored: TransferSnapshot = f.storage.retrieve(TRANSFERS, &id).await.unwrap();
		assert_eq!(stored.state, TransferState::Completed);
		let stored = stored.transfer.unwrap();
		assert_eq!(stored.source_txids, source);
		assert_eq!(stored.attestations, attestations);
		assert_eq!(stored.destination_txids, destination);

		assert_eq!(
			transfer_events(&mut events),
			vec!["built", "initiated", "pending", "attested", "completed"]
		);
	}

	#[tokio::test]
	async fn test_attestation_timeout_is_retryable() {
		let f = Fixture::connected(simulated().with_attestation_delay(Duration::from_millis(300)))
			.await;
		let orchestrator = f.orchestrator();
		f.initiated(&orchestrator).await;

		let err = orchestrator
			.fetch_attestation(Some(Duration::from_millis(1)))
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::AttestationTimeout(_)));
		assert_eq!(err.kind(), FailureKind::AttestationTimedOut);
		assert_eq!(orchestrator.state(), TransferState::AttestationPending);
		assert!(orchestrator.snapshot().last_error.is_some());

		let attestations = orchestrator
			.fetch_attestation(Some(Duration::from_secs(5)))
			.await
			.unwrap();
		assert_eq!(attestations.len(), 1);
		assert_eq!(orchestrator.state(), TransferState::Attested);
		assert!(orchestrator.snapshot().last_error.is_none());
		// The source transaction was not submitted again.
		assert_eq!(f.sends(), 1);
	}

	#[tokio::test]
	async fn test_complete_before_attestation_fails() {
		let f = Fixture::connected(simulated()).await;
		let orchestrator = f.orchestrator();
		f.initiated(&orchestrator).await;

		let err = orchestrator
			.complete_transfer(f.session.as_ref())
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			TransferError::InvalidState {
				state: TransferState::Initiated,
				..
			}
		));
		let snapshot = orchestrator.snapshot();
		assert_eq!(snapshot.state, TransferState::Initiated);
		assert!(snapshot.transfer.unwrap().destination_txids.is_empty());
		assert!(f.wallet.requests_for("wallet_switchEthereumChain").is_empty());
		assert_eq!(f.sends(), 1);
	}

	#[tokio::test]
	async fn test_phases_out_of_order() {
		let f = Fixture::connected(simulated()).await;
		let orchestrator = f.orchestrator();

		assert!(matches!(
			orchestrator.fetch_attestation(None).await,
			Err(TransferError::InvalidState {
				state: TransferState::Idle,
				..
			})
		));
		assert!(matches!(
			orchestrator.initiate_transfer(f.session.as_ref()).await,
			Err(TransferError::InvalidState { .. })
		));

		orchestrator
			.build_transfer(f.session.as_ref(), to_avalanche())
			.await
			.unwrap();
		assert!(matches!(
			orchestrator
				.build_transfer(f.session.as_ref(), to_avalanche())
				.await,
			Err(TransferError::InvalidState {
				state: TransferState::Built,
				..
			})
		));
		assert!(matches!(
			orchestrator.fetch_attestation(None).await,
			Err(TransferError::InvalidState { .. })
		));
		assert_eq!(f.sends(), 0);
	}

	#[tokio::test]
	async fn test_rejected_initiation_stays_built() {
		let f = Fixture::connected(simulated()).await;
		let orchestrator = f.orchestrator();
		orchestrator
			.build_transfer(f.session.as_ref(), to_avalanche())
			.await
			.unwrap();

		f.wallet.reject_after(0);
		let err = orchestrator
			.initiate_transfer(f.session.as_ref())
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::InitiationFailed(_)));
		assert_eq!(err.kind(), FailureKind::TransactionRejected);
		assert!(err.submitted().is_empty());
		assert_eq!(orchestrator.state(), TransferState::Built);

		f.wallet.reject_after(10);
		let txids = orchestrator
			.initiate_transfer(f.session.as_ref())
			.await
			.unwrap();
		assert_eq!(txids.len(), 1);
		assert_eq!(orchestrator.state(), TransferState::Initiated);
	}

	#[tokio::test]
	async fn test_contract_token_partial_submission() {
		let f = Fixture::connected(simulated()).await;
		let orchestrator = f.orchestrator();
		let built = orchestrator
			.build_transfer(
				f.session.as_ref(),
				to_avalanche().with_token(USDC).with_amount("2.5"),
			)
			.await
			.unwrap();
		let amount = built.transfer.unwrap().details.amount;
		assert_eq!(amount.decimals, 6);
		assert_eq!(amount.units, U256::from(2_500_000u64));

		// Approval goes through, the transfer itself is declined.
		f.wallet.reject_after(1);
		let err = orchestrator
			.initiate_transfer(f.session.as_ref())
			.await
			.unwrap_err();
		assert_eq!(err.submitted().len(), 1);
		assert_eq!(orchestrator.state(), TransferState::Built);
		let snapshot = orchestrator.snapshot();
		assert_eq!(snapshot.submitted_txids, err.submitted());
		let transfer = snapshot.transfer.unwrap();
		assert!(transfer.source_txids.is_empty());

		// the accepted approval is persisted for status queries
		let stored: TransferSnapshot = f
			.storage
			.retrieve(TRANSFERS, &transfer.id)
			.await
			.unwrap();
		assert_eq!(stored.submitted_txids, err.submitted());

		// and survives the successful retry
		f.wallet.reject_after(10);
		orchestrator
			.initiate_transfer(f.session.as_ref())
			.await
			.unwrap();
		assert_eq!(orchestrator.snapshot().submitted_txids, err.submitted());
	}

	#[tokio::test]
	async fn test_build_without_signer() {
		let f = Fixture::new(simulated());
		let orchestrator = f.orchestrator();

		let err = orchestrator
			.build_transfer(f.session.as_ref(), to_avalanche())
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::NoSigner));
		assert_eq!(err.kind(), FailureKind::WalletNotConnected);
		assert_eq!(orchestrator.state(), TransferState::Idle);
		assert!(f.wallet.requests().is_empty());
	}

	#[tokio::test]
	async fn test_build_on_chain_unknown_to_platform() {
		let avalanche_only = ChainRegistry::from_entries(vec![ChainEntry::new(
			Network::Testnet,
			"Avalanche",
			NativeChainId::Evm(43113),
		)])
		.unwrap();
		let platform = SimulatedPlatform::new(Arc::new(avalanche_only), Network::Testnet);
		let f = Fixture::connected(platform).await;

		let err = f
			.orchestrator()
			.build_transfer(f.session.as_ref(), to_avalanche())
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::NoPlatform(chain) if chain == Chain::new("Sepolia")));
	}

	#[tokio::test]
	async fn test_chain_change_invalidates_source_signer() {
		let f = Fixture::connected(simulated()).await;
		let listener = f.session.spawn_listener();
		let orchestrator = f.orchestrator();
		orchestrator
			.build_transfer(f.session.as_ref(), to_avalanche())
			.await
			.unwrap();
		let stale = f.session.current().unwrap();

		f.wallet.change_chain(AVALANCHE_FUJI);
		tokio::time::timeout(Duration::from_secs(1), async {
			while f.session.generation() < 2 {
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
		})
		.await
		.unwrap();
		assert!(stale.is_revoked());

		let err = orchestrator
			.initiate_transfer(f.session.as_ref())
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			TransferError::InitiationFailed(PlatformError::Signer(SignerError::ChainMismatch { .. }))
		));
		assert_eq!(err.kind(), FailureKind::WrongNetwork);
		assert_eq!(orchestrator.state(), TransferState::Built);
		assert_eq!(f.sends(), 0);

		listener.abort();
	}

	#[tokio::test]
	async fn test_multiple_attestations_required() {
		let f = Fixture::connected(simulated().with_messages(2)).await;
		let orchestrator = f.orchestrator();
		f.initiated(&orchestrator).await;

		let first = orchestrator.fetch_attestation(None).await.unwrap();
		assert_eq!(first.len(), 1);
		assert_eq!(orchestrator.state(), TransferState::AttestationPending);
		assert!(matches!(
			orchestrator.complete_transfer(f.session.as_ref()).await,
			Err(TransferError::InvalidState { .. })
		));

		let both = orchestrator.fetch_attestation(None).await.unwrap();
		assert_eq!(both.len(), 2);
		assert_ne!(both[0], both[1]);
		assert_eq!(orchestrator.state(), TransferState::Attested);

		let destination = orchestrator
			.complete_transfer(f.session.as_ref())
			.await
			.unwrap();
		assert_eq!(destination.len(), 2);
	}

	#[tokio::test]
	async fn test_failed_completion_stays_attested() {
		let f = Fixture::connected(simulated()).await;
		let orchestrator = f.orchestrator();
		f.initiated(&orchestrator).await;
		orchestrator.fetch_attestation(None).await.unwrap();

		f.wallet.reject_after(0);
		let err = orchestrator
			.complete_transfer(f.session.as_ref())
			.await
			.unwrap_err();
		assert!(matches!(err, TransferError::CompletionFailed(_)));
		assert_eq!(err.kind(), FailureKind::CompletionFailed);
		let snapshot = orchestrator.snapshot();
		assert_eq!(snapshot.state, TransferState::Attested);
		assert!(snapshot.transfer.unwrap().destination_txids.is_empty());

		f.wallet.reject_after(10);
		orchestrator
			.complete_transfer(f.session.as_ref())
			.await
			.unwrap();
		assert_eq!(orchestrator.state(), TransferState::Completed);
		// The retry found the signer already on the destination chain.
		assert_eq!(f.wallet.requests_for("wallet_switchEthereumChain").len(), 1);
	}

	#[tokio::test]
	async fn test_concurrent_phase_is_busy() {
		let f = Fixture::connected(simulated().with_attestation_delay(Duration::from_millis(300)))
			.await;
		let orchestrator = Arc::new(f.orchestrator());
		f.initiated(&orchestrator).await;

		let waiting = {
			let orchestrator = orchestrator.clone();
			tokio::spawn(async move {
				orchestrator
					.fetch_attestation(Some(Duration::from_secs(5)))
					.await
			})
		};
		tokio::time::sleep(Duration::from_millis(50)).await;

		assert!(matches!(
			orchestrator.complete_transfer(f.session.as_ref()).await,
			Err(TransferError::Busy)
		));
		assert!(waiting.await.unwrap().is_ok());
		assert_eq!(orchestrator.state(), TransferState::Attested);
	}

	#[tokio::test]
	async fn test_resume_from_storage() {
		let f = Fixture::connected(simulated()).await;
		let first = f.orchestrator();
		f.initiated(&first).await;
		let id = first.transfer_id().unwrap();
		drop(first);

		let stored: TransferSnapshot = f.storage.retrieve(TRANSFERS, &id).await.unwrap();
		let resumed = TransferOrchestrator::resume(
			f.platform.clone(),
			f.storage.clone(),
			f.events.clone(),
			TransferSettings::default(),
			stored,
		);
		assert_eq!(resumed.state(), TransferState::Initiated);

		resumed.fetch_attestation(None).await.unwrap();
		resumed
			.complete_transfer(f.session.as_ref())
			.await
			.unwrap();
		assert_eq!(resumed.state(), TransferState::Completed);
		assert_eq!(f.sends(), 2);
	}

	#[tokio::test]
	async fn test_abandon() {
		let f = Fixture::connected(simulated()).await;
		let orchestrator = f.orchestrator();
		let mut events = orchestrator.subscribe();
		orchestrator
			.build_transfer(f.session.as_ref(), to_avalanche())
			.await
			.unwrap();

		let snapshot = orchestrator.abandon("user cancelled").await.unwrap();
		assert_eq!(snapshot.state, TransferState::Failed);
		assert!(matches!(
			orchestrator.initiate_transfer(f.session.as_ref()).await,
			Err(TransferError::InvalidState {
				state: TransferState::Failed,
				..
			})
		));
		assert!(orchestrator.abandon("again").await.is_err());
		assert_eq!(
			transfer_events(&mut events),
			vec!["built", "abandoned", "failed"]
		);
	}
}
