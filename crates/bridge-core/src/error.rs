use bridge_platform::PlatformError;
use bridge_signer::SignerError;
use bridge_storage::StorageError;
use bridge_types::{AmountError, Chain, TransferState, TxId};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What the presentation layer should tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
	WalletNotConnected,
	WrongNetwork,
	TransactionRejected,
	AttestationTimedOut,
	CompletionFailed,
	Internal,
}

impl fmt::Display for FailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			FailureKind::WalletNotConnected => "wallet not connected",
			FailureKind::WrongNetwork => "wrong network, please switch",
			FailureKind::TransactionRejected => "transaction rejected",
			FailureKind::AttestationTimedOut => "waiting for confirmation timed out, retry",
			FailureKind::CompletionFailed => "completion failed, retry",
			FailureKind::Internal => "internal error",
		};
		f.write_str(text)
	}
}

/// Failure of a transfer phase.
///
/// The transfer stays in the last state it reached, so every variant except
/// [`TransferError::InvalidState`] can be retried by calling the same phase
/// again.
#[derive(Debug, Error)]
pub enum TransferError {
	/// The wallet session has no live signer.
	#[error("No signer is bound to the wallet")]
	NoSigner,
	/// The platform has no context for the chain.
	#[error("Platform does not support chain {0}")]
	NoPlatform(Chain),
	/// Source submission failed; the transfer stays `Built`.
	#[error("Initiation failed: {0}")]
	InitiationFailed(#[source] PlatformError),
	/// No attestation arrived in time. The source submission is final, so
	/// waiting again is the only recovery.
	#[error("No attestation within {0:?}")]
	AttestationTimeout(Duration),
	/// Destination submission failed; the transfer stays `Attested`.
	#[error("Completion failed: {0}")]
	CompletionFailed(#[source] PlatformError),
	/// A phase was invoked out of order.
	#[error("Cannot {operation} a transfer in state {state}")]
	InvalidState {
		state: TransferState,
		operation: &'static str,
	},
	/// Another phase of the same transfer is still running.
	#[error("Another phase operation is in progress")]
	Busy,
	#[error("Wallet error: {0}")]
	Wallet(#[from] SignerError),
	#[error("Platform error: {0}")]
	Platform(PlatformError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Invalid amount: {0}")]
	Amount(#[from] AmountError),
}

impl TransferError {
	pub fn kind(&self) -> FailureKind {
		match self {
			TransferError::NoSigner => FailureKind::WalletNotConnected,
			TransferError::NoPlatform(_) => FailureKind::WrongNetwork,
			TransferError::Wallet(e) => signer_kind(e).unwrap_or(FailureKind::Internal),
			TransferError::InitiationFailed(e) => platform_signer_kind(e)
				.unwrap_or(FailureKind::TransactionRejected),
			TransferError::AttestationTimeout(_) => FailureKind::AttestationTimedOut,
			TransferError::CompletionFailed(e) => match platform_signer_kind(e) {
				Some(kind @ (FailureKind::WalletNotConnected | FailureKind::WrongNetwork)) => kind,
				_ => FailureKind::CompletionFailed,
			},
			TransferError::InvalidState { .. }
			| TransferError::Busy
			| TransferError::Platform(_)
			| TransferError::Storage(_)
			| TransferError::Amount(_) => FailureKind::Internal,
		}
	}

	/// Source transactions a failed initiation already submitted.
	pub fn submitted(&self) -> &[TxId] {
		match self {
			TransferError::InitiationFailed(PlatformError::Signer(SignerError::SignRejected {
				collected,
				..
			})) => collected,
			_ => &[],
		}
	}
}

fn platform_signer_kind(err: &PlatformError) -> Option<FailureKind> {
	match err {
		PlatformError::Signer(e) => signer_kind(e),
		PlatformError::UnsupportedChain(_) => Some(FailureKind::WrongNetwork),
		_ => None,
	}
}

fn signer_kind(err: &SignerError) -> Option<FailureKind> {
	match err {
		SignerError::NoAccount
		| SignerError::NoChain
		| SignerError::Stale
		| SignerError::Disconnected => Some(FailureKind::WalletNotConnected),
		SignerError::UnsupportedChain(_)
		| SignerError::NetworkMismatch { .. }
		| SignerError::ChainMismatch { .. }
		| SignerError::WrongFamily { .. }
		| SignerError::SwitchUnsupported(_)
		| SignerError::Registry(_) => Some(FailureKind::WrongNetwork),
		SignerError::SignRejected { .. } => Some(FailureKind::TransactionRejected),
		SignerError::UnsupportedPayload { .. }
		| SignerError::Provider(_)
		| SignerError::Config(_) => None,
	}
}

/// Errors raised while wiring the engine from configuration.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Registry error: {0}")]
	Registry(#[from] bridge_registry::RegistryError),
	#[error("Wallet error: {0}")]
	Wallet(#[from] SignerError),
	#[error("Platform error: {0}")]
	Platform(#[from] PlatformError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}
