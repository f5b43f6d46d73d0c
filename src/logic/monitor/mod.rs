//! Security Monitor
//!
//! Ingests typed security events, buffers them, flags immediate-alert conditions
//! and answers queries over the recent window.
//!
//! # Flow
//! ```text
//! log_event → SecurityEvent → buffer + pending → (every flush interval) → EventStore
//!                           ↘ check_immediate_alert → warn log
//! ```
//!
//! Immediate-alert matches are only logged here; the pipeline forwards them to alerting.

pub mod types;
#[cfg(test)]
mod tests;

pub use types::{EventFilter, EventStatistics, ImmediateAlertReason, MonitorStatus};

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::logic::config::MonitorConfig;
use crate::logic::events::{
    EventDetails, EventOptions, SecurityEvent, SecurityEventType, Severity,
};
use crate::logic::store::{EventStore, StoreResult};

const LOG_TARGET: &str = "security";

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct SecurityMonitor {
    config: MonitorConfig,
    store: Arc<dyn EventStore>,
    buffer: RwLock<VecDeque<SecurityEvent>>,
    pending: Mutex<Vec<SecurityEvent>>,
    last_flush: RwLock<Option<DateTime<Utc>>>,
    worker: Mutex<Option<Worker>>,
    shut_down: AtomicBool,
}

impl SecurityMonitor {
    pub fn new(config: MonitorConfig, store: Arc<dyn EventStore>) -> Self {
        Self {
            config,
            store,
            buffer: RwLock::new(VecDeque::new()),
            pending: Mutex::new(Vec::new()),
            last_flush: RwLock::new(None),
            worker: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    // ========================================================================
    // INGEST
    // ========================================================================

    /// Create, buffer and log an event. Never fails.
    pub fn log_event(
        &self,
        event_type: SecurityEventType,
        details: EventDetails,
        options: EventOptions,
    ) -> SecurityEvent {
        let event = SecurityEvent::new(event_type, details, options);
        self.record_event(event.clone());
        event
    }

    pub fn log_auth_event(
        &self,
        event_type: SecurityEventType,
        details: EventDetails,
        options: EventOptions,
    ) -> SecurityEvent {
        self.log_event(event_type, details, options.source("auth"))
    }

    pub fn log_rate_limit_event(
        &self,
        event_type: SecurityEventType,
        details: EventDetails,
        options: EventOptions,
    ) -> SecurityEvent {
        self.log_event(event_type, details, options.source("rate_limiter"))
    }

    /// Payment events are always at least high severity
    pub fn log_payment_event(
        &self,
        event_type: SecurityEventType,
        details: EventDetails,
        options: EventOptions,
    ) -> SecurityEvent {
        self.log_event(event_type, details, options.source("payment").severity(Severity::High))
    }

    pub fn log_authz_event(
        &self,
        event_type: SecurityEventType,
        details: EventDetails,
        options: EventOptions,
    ) -> SecurityEvent {
        self.log_event(event_type, details, options.source("authorization"))
    }

    pub fn log_data_event(
        &self,
        event_type: SecurityEventType,
        details: EventDetails,
        options: EventOptions,
    ) -> SecurityEvent {
        self.log_event(event_type, details, options.source("data_access"))
    }

    /// Buffer an already-built event (detector output, replayed events)
    pub fn record_event(&self, event: SecurityEvent) {
        log::log!(
            target: LOG_TARGET,
            event.severity.log_level(),
            "[{}] {} source={} user={} ip={} details={}",
            event.severity,
            event.event_type,
            event.source,
            event.user_id.as_deref().unwrap_or("-"),
            event.ip_address.as_deref().unwrap_or("-"),
            serde_json::Value::Object(event.details.clone()),
        );

        if let Some(reason) = self.check_immediate_alert(&event) {
            log::warn!(
                target: LOG_TARGET,
                "Immediate alert condition {} on event {}",
                reason,
                event.id
            );
        }

        self.pending.lock().push(event.clone());
        self.buffer.write().push_back(event);
    }

    /// Immediate-alert rules: critical severity, repeated login failures,
    /// IP auto-block, suspected payment fraud
    pub fn check_immediate_alert(&self, event: &SecurityEvent) -> Option<ImmediateAlertReason> {
        if event.severity == Severity::Critical {
            return Some(ImmediateAlertReason::CriticalSeverity);
        }

        match event.event_type {
            SecurityEventType::AuthLoginFailure => event
                .detail_u64("attempts")
                .filter(|n| *n > self.config.login_failure_alert_threshold)
                .map(|attempts| ImmediateAlertReason::RepeatedLoginFailures { attempts }),
            SecurityEventType::RateLimitIpBlocked => Some(ImmediateAlertReason::IpAutoBlocked),
            SecurityEventType::PaymentFraudSuspected => {
                Some(ImmediateAlertReason::PaymentFraudSuspected)
            }
            _ => None,
        }
    }

    // ========================================================================
    // QUERY
    // ========================================================================

    /// Most-recent-first, filtered
    pub fn get_recent_events(&self, limit: usize, filter: Option<&EventFilter>) -> Vec<SecurityEvent> {
        let cutoff = filter.and_then(|f| f.timeframe).and_then(cutoff_for);
        let buffer = self.buffer.read();

        let mut events: Vec<SecurityEvent> = buffer
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(e, cutoff)))
            .cloned()
            .collect();
        drop(buffer);

        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        events
    }

    /// Events sharing the user or the address, most recent first
    pub fn related_events(
        &self,
        user_id: Option<&str>,
        ip_address: Option<&str>,
        limit: usize,
    ) -> Vec<SecurityEvent> {
        if user_id.is_none() && ip_address.is_none() {
            return Vec::new();
        }
        let mut events: Vec<SecurityEvent> = self.buffer.read()
            .iter()
            .filter(|e| {
                (user_id.is_some() && e.user_id.as_deref() == user_id)
                    || (ip_address.is_some() && e.ip_address.as_deref() == ip_address)
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        events
    }

    pub fn get_statistics(&self, timeframe: Duration) -> EventStatistics {
        let cutoff = cutoff_for(timeframe);
        let buffer = self.buffer.read();

        let mut stats = EventStatistics {
            timeframe_secs: timeframe.as_secs(),
            ..Default::default()
        };
        let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
        let mut users = HashSet::new();
        let mut ips = HashSet::new();

        for event in buffer.iter().filter(|e| cutoff.map_or(true, |c| e.timestamp >= c)) {
            stats.total_events += 1;
            *by_severity.entry(event.severity).or_insert(0) += 1;
            *stats.by_type.entry(event.event_type.as_str().to_string()).or_insert(0) += 1;
            if let Some(ref u) = event.user_id {
                users.insert(u.as_str());
            }
            if let Some(ref ip) = event.ip_address {
                ips.insert(ip.as_str());
            }
        }

        stats.by_severity = by_severity;
        stats.unique_users = users.len();
        stats.unique_ips = ips.len();
        stats
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.worker.lock().is_some(),
            buffered_events: self.buffer.read().len(),
            pending_flush: self.pending.lock().len(),
            last_flush: *self.last_flush.read(),
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.read().len()
    }

    // ========================================================================
    // FLUSH & RETENTION
    // ========================================================================

    /// Move pending events into the event store. A failed write re-queues the batch.
    pub async fn flush(&self) -> StoreResult<usize> {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return Ok(0);
        }

        match self.store.append(&batch).await {
            Ok(()) => {
                *self.last_flush.write() = Some(Utc::now());
                log::debug!(target: LOG_TARGET, "Flushed {} security events", batch.len());
                Ok(batch.len())
            }
            Err(e) => {
                let mut pending = self.pending.lock();
                let newer = std::mem::replace(&mut *pending, batch);
                pending.extend(newer);
                Err(e)
            }
        }
    }

    /// Evict events past retention or beyond the buffer cap; returns the number removed
    pub async fn cleanup_old_events(&self) -> usize {
        let cutoff = cutoff_for(self.config.retention());
        let mut removed = 0;

        {
            let mut buffer = self.buffer.write();
            let before = buffer.len();
            if let Some(c) = cutoff {
                buffer.retain(|e| e.timestamp >= c);
            }
            while buffer.len() > self.config.max_event_buffer {
                buffer.pop_front();
            }
            removed += before - buffer.len();
        }

        if let Some(c) = cutoff {
            match self.store.purge_before(c).await {
                Ok(n) => removed += n,
                Err(e) => log::error!(target: LOG_TARGET, "Event store purge failed: {}", e),
            }
        }

        if removed > 0 {
            log::info!(target: LOG_TARGET, "Evicted {} old security events", removed);
        }
        removed
    }

    /// Reload the retention window from the event store into the buffer, e.g. after
    /// a restart. Events already buffered are skipped, nothing is re-queued for flush,
    /// and the buffer cap keeps the newest events. Returns how much the buffer grew.
    pub async fn restore_from_store(&self) -> StoreResult<usize> {
        let Some(cutoff) = cutoff_for(self.config.retention()) else {
            return Ok(0);
        };
        let stored = self.store.load_since(cutoff).await?;

        let mut buffer = self.buffer.write();
        let known: HashSet<String> = buffer.iter().map(|e| e.id.clone()).collect();
        let before = buffer.len();

        let mut merged: Vec<SecurityEvent> = stored
            .into_iter()
            .filter(|e| !known.contains(&e.id))
            .collect();
        merged.extend(buffer.drain(..));
        merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let overflow = merged.len().saturating_sub(self.config.max_event_buffer);
        buffer.extend(merged.into_iter().skip(overflow));

        let added = buffer.len().saturating_sub(before);
        log::info!(target: LOG_TARGET, "Restored {} security events from store", added);
        Ok(added)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Spawn the periodic flush + cleanup task. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() || self.shut_down.load(Ordering::SeqCst) {
            return;
        }

        let (stop, stop_rx) = watch::channel(false);
        let monitor = Arc::downgrade(self);
        let interval = self.config.flush_interval();
        let handle = tokio::spawn(flush_loop(monitor, interval, stop_rx));

        *worker = Some(Worker { stop, handle });
        log::info!(target: LOG_TARGET, "Security monitor started (flush every {}s)", interval.as_secs());
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Stop the background task, wait for it, then flush once more. Idempotent.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(true);
            if let Err(e) = worker.handle.await {
                log::error!(target: LOG_TARGET, "Monitor task ended abnormally: {}", e);
            }
        }

        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.flush().await {
            log::error!(target: LOG_TARGET, "Final flush failed: {}", e);
        }
        log::info!(target: LOG_TARGET, "Security monitor stopped");
    }
}

async fn flush_loop(monitor: Weak<SecurityMonitor>, interval: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }

        let Some(m) = monitor.upgrade() else { break };
        if let Err(e) = m.flush().await {
            log::error!(target: LOG_TARGET, "Periodic flush failed: {}", e);
        }
        m.cleanup_old_events().await;
    }
}

fn cutoff_for(window: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|d| Utc::now().checked_sub_signed(d))
}
