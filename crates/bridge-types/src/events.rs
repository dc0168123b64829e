use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{AttestationId, Chain, ChainFamily, TransferState, TxId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BridgeEvent {
	Wallet(WalletEvent),
	Transfer(TransferEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalletEvent {
	Connected {
		family: ChainFamily,
		chain: Chain,
		address: String,
		generation: u64,
	},
	ChainChanged {
		family: ChainFamily,
		native_chain_id: String,
	},
	Disconnected {
		family: ChainFamily,
		reason: String,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransferEvent {
	Built {
		transfer_id: String,
	},
	Initiated {
		transfer_id: String,
		txids: Vec<TxId>,
	},
	AttestationPending {
		transfer_id: String,
	},
	Attested {
		transfer_id: String,
		attestations: Vec<AttestationId>,
	},
	Completed {
		transfer_id: String,
		txids: Vec<TxId>,
	},
	PhaseFailed {
		transfer_id: Option<String>,
		state: TransferState,
		error: String,
	},
	Abandoned {
		transfer_id: Option<String>,
		reason: String,
	},
}

pub struct EventBus {
	sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
		self.sender.subscribe()
	}

	pub fn publish(
		&self,
		event: BridgeEvent,
	) -> Result<(), broadcast::error::SendError<BridgeEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}
