//! Storage Module
//!
//! Storage seams used by the engines. Every engine talks to a trait object so the
//! in-memory implementations (tests, single instance) and the SQLite
//! implementations (durable, shared file) are interchangeable.
//!
//! # Components
//! - `EventStore`: durable sink for flushed security events
//! - `KeyValueStore`: keyed blobs with per-key TTL (baselines, actions,
//!   assessments, mirrored alerts and incidents)
//!
//! A missing key is `Ok(None)`, never an error.

mod error;
pub mod memory;
pub mod sqlite;
#[cfg(test)]
mod tests;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryEventStore, MemoryKeyValueStore};
pub use sqlite::{SqliteEventStore, SqliteKeyValueStore};

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constants::DATA_DIR_NAME;
use crate::logic::events::SecurityEvent;

/// Durable sink for security events flushed out of the monitor buffer
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch; re-appending an already stored event id is a no-op
    async fn append(&self, events: &[SecurityEvent]) -> StoreResult<()>;

    /// All events with `timestamp >= cutoff`, oldest first
    async fn load_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<SecurityEvent>>;

    /// Delete events older than `cutoff`, returning how many were removed
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;

    async fn count(&self) -> StoreResult<usize>;
}

/// Keyed blob store with per-key TTL (`Duration::ZERO` = never expires)
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Returns true if the key existed
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Live (non-expired) keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> StoreResult<usize>;
}

/// Read and deserialize a JSON value
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> StoreResult<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, &bytes, ttl).await
}

/// Default database location (platform data dir)
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
        .join("secmon.db")
}
