//! In-memory store implementations
//!
//! Bounded ring buffer for events, TTL map for keyed data.
//! Correct only within a single process.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{EventStore, KeyValueStore, StoreResult};
use crate::logic::events::SecurityEvent;

// ============================================================================
// EVENT STORE
// ============================================================================

pub struct MemoryEventStore {
    events: RwLock<VecDeque<SecurityEvent>>,
    ids: RwLock<HashSet<String>>,
    capacity: usize,
}

impl MemoryEventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            ids: RwLock::new(HashSet::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, events: &[SecurityEvent]) -> StoreResult<()> {
        let mut stored = self.events.write();
        let mut ids = self.ids.write();

        for event in events {
            if ids.insert(event.id.clone()) {
                stored.push_back(event.clone());
            }
        }

        while stored.len() > self.capacity {
            if let Some(old) = stored.pop_front() {
                ids.remove(&old.id);
            }
        }
        Ok(())
    }

    async fn load_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<SecurityEvent>> {
        let mut list: Vec<SecurityEvent> = self.events.read()
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(list)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut stored = self.events.write();
        let mut ids = self.ids.write();
        let before = stored.len();
        stored.retain(|e| {
            let keep = e.timestamp >= cutoff;
            if !keep {
                ids.remove(&e.id);
            }
            keep
        });
        Ok(before - stored.len())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.events.read().len())
    }
}

// ============================================================================
// KEY-VALUE STORE
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }
}

/// TTL map; expired entries are invisible immediately and removed lazily
#[derive(Default)]
pub struct MemoryKeyValueStore {
    data: RwLock<HashMap<String, Entry>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.data.read().values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn expiry_for(ttl: Duration) -> Option<DateTime<Utc>> {
    if ttl.is_zero() {
        return None;
    }
    chrono::Duration::from_std(ttl).ok().map(|d| Utc::now() + d)
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = Utc::now();
        let data = self.data.read();
        Ok(data.get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.data.write().insert(key.to_string(), Entry {
            value: value.to_vec(),
            expires_at: expiry_for(ttl),
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = Utc::now();
        let mut keys: Vec<String> = self.data.read()
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let now = Utc::now();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, e| !e.is_expired(now));
        Ok(before - data.len())
    }
}
