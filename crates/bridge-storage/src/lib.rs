//! Durable storage for transfer snapshots.
//!
//! Backends store opaque bytes under string keys; [`StorageService`] layers
//! JSON serialization and `namespace:id` keys on top so that a transfer that
//! reached `Initiated` or `AttestationPending` survives a restart.

use async_trait::async_trait;
use bridge_types::{ConfigSchema, ValidationError};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Namespace transfer snapshots are stored under.
pub const TRANSFERS: &str = "transfers";

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// No value under the key; carries the key.
	#[error("Not found: {0}")]
	NotFound(String),
	/// A value could not be encoded or decoded as JSON.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error reported by the storage backend, such as an I/O failure.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Invalid backend configuration.
	#[error("Configuration error: {0}")]
	Config(String),
}

impl From<ValidationError> for StorageError {
	fn from(err: ValidationError) -> Self {
		StorageError::Config(err.to_string())
	}
}

/// Low-level key/value interface implemented by storage backends.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Returns the configuration schema for this backend.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Raw bytes stored under `key`.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores `value` under `key`, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deleting a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Keys starting with `prefix`, sorted.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Typed storage on top of a backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

fn key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Serializes `data` to JSON under `namespace:id`.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key(namespace, id), bytes).await
	}

	/// Loads and deserializes the value under `namespace:id`.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&key(namespace, id)).await
	}

	pub async fn contains(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&key(namespace, id)).await
	}

	/// Ids stored under `namespace`.
	pub async fn list(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let prefix = key(namespace, "");
		Ok(self
			.backend
			.list_keys(&prefix)
			.await?
			.into_iter()
			.filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Record {
		state: String,
		txids: Vec<String>,
	}

	#[tokio::test]
	async fn test_typed_roundtrip_and_listing() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let record = Record {
			state: "Initiated".into(),
			txids: vec!["0xabc".into()],
		};

		storage.store(TRANSFERS, "t1", &record).await.unwrap();
		storage.store(TRANSFERS, "t2", &record).await.unwrap();
		storage.store("other", "t3", &record).await.unwrap();

		let loaded: Record = storage.retrieve(TRANSFERS, "t1").await.unwrap();
		assert_eq!(loaded, record);
		assert_eq!(storage.list(TRANSFERS).await.unwrap(), vec!["t1", "t2"]);

		storage.remove(TRANSFERS, "t1").await.unwrap();
		assert!(!storage.contains(TRANSFERS, "t1").await.unwrap());
		assert!(matches!(
			storage.retrieve::<Record>(TRANSFERS, "t1").await,
			Err(StorageError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_corrupt_value_is_serialization_error() {
		let backend = MemoryStorage::new();
		backend
			.set_bytes("transfers:bad", b"not json".to_vec())
			.await
			.unwrap();
		let storage = StorageService::new(Box::new(backend));
		assert!(matches!(
			storage.retrieve::<Record>(TRANSFERS, "bad").await,
			Err(StorageError::Serialization(_))
		));
	}
}
