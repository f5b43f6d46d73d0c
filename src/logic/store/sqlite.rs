//! SQLite store implementations
//!
//! Durable backends for events and keyed data. One connection per store,
//! guarded by a mutex; several stores may share one database file.
//! Every statement runs on the blocking pool, never on a runtime worker.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::memory::expiry_for;
use super::{EventStore, KeyValueStore, StoreError, StoreResult};
use crate::logic::events::SecurityEvent;

type SharedConnection = Arc<Mutex<Connection>>;

fn open_connection(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Run `f` against the connection on the blocking pool
async fn blocking<T, F>(conn: &SharedConnection, f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
{
    let conn = conn.clone();
    tokio::task::spawn_blocking(move || f(&mut conn.lock()))
        .await
        .map_err(|e| StoreError::Unavailable(format!("SQLite task failed: {}", e)))?
}

// ============================================================================
// EVENT STORE
// ============================================================================

pub struct SqliteEventStore {
    conn: SharedConnection,
}

impl SqliteEventStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::with_connection(open_connection(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS security_events (
                id          TEXT PRIMARY KEY,
                ts          INTEGER NOT NULL,
                event_type  TEXT NOT NULL,
                severity    TEXT NOT NULL,
                user_id     TEXT,
                payload     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_security_events_ts ON security_events(ts);",
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, events: &[SecurityEvent]) -> StoreResult<()> {
        let events = events.to_vec();
        blocking(&self.conn, move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO security_events (id, ts, event_type, severity, user_id, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for event in &events {
                    let payload = serde_json::to_string(event)?;
                    stmt.execute(params![
                        event.id,
                        event.timestamp.timestamp_millis(),
                        event.event_type.as_str(),
                        event.severity.as_str(),
                        event.user_id,
                        payload,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<SecurityEvent>> {
        blocking(&self.conn, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM security_events WHERE ts >= ?1 ORDER BY ts ASC",
            )?;
            let rows = stmt.query_map(params![cutoff.timestamp_millis()], |row| row.get::<_, String>(0))?;

            let mut events = Vec::new();
            for payload in rows {
                events.push(serde_json::from_str(&payload?)?);
            }
            Ok(events)
        })
        .await
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        blocking(&self.conn, move |conn| {
            let removed = conn.execute(
                "DELETE FROM security_events WHERE ts < ?1",
                params![cutoff.timestamp_millis()],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn count(&self) -> StoreResult<usize> {
        blocking(&self.conn, |conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM security_events", [], |row| row.get(0))?;
            Ok(n.max(0) as usize)
        })
        .await
    }
}

// ============================================================================
// KEY-VALUE STORE
// ============================================================================

pub struct SqliteKeyValueStore {
    conn: SharedConnection,
}

impl SqliteKeyValueStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::with_connection(open_connection(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key         TEXT PRIMARY KEY,
                value       BLOB NOT NULL,
                expires_at  INTEGER
            );",
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = key.to_string();
        blocking(&self.conn, move |conn| {
            let now = Utc::now().timestamp_millis();
            let row: Option<(Vec<u8>, Option<i64>)> = conn
                .query_row(
                    "SELECT value, expires_at FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((_, Some(exp))) if exp <= now => {
                    conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let expires_at = expiry_for(ttl).map(|t| t.timestamp_millis());
        let (key, value) = (key.to_string(), value.to_vec());
        blocking(&self.conn, move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_store (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let key = key.to_string();
        blocking(&self.conn, move |conn| {
            let removed = conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = prefix.to_string();
        blocking(&self.conn, move |conn| {
            let now = Utc::now().timestamp_millis();
            let mut stmt = conn.prepare(
                "SELECT key FROM kv_store
                 WHERE substr(key, 1, length(?1)) = ?1
                   AND (expires_at IS NULL OR expires_at > ?2)
                 ORDER BY key ASC",
            )?;
            let rows = stmt.query_map(params![prefix, now], |row| row.get::<_, String>(0))?;
            let keys = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        blocking(&self.conn, |conn| {
            let now = Utc::now().timestamp_millis();
            let removed = conn.execute(
                "DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?;
            Ok(removed)
        })
        .await
    }
}
