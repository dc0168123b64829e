//! Shared types for the cross-chain bridge wallet.

pub mod amount;
pub mod chains;
pub mod events;
pub mod transaction;
pub mod transfer;
pub mod validation;

pub use amount::*;
pub use chains::*;
pub use events::*;
pub use transaction::*;
pub use transfer::*;
pub use validation::*;

pub use alloy::primitives::U256;
