//! Security Alerting Module
//!
//! Fan-out notifier: dedup → record → route by severity threshold → concurrent delivery.
//!
//! # Guarantees
//! - Near-identical titles at the same severity inside the dedup window are suppressed
//! - A failing or slow channel never affects its siblings or the caller
//! - Lifecycle: active → acknowledged → resolved, or active → dismissed
//!
//! # Usage
//! ```ignore
//! let alerting = SecurityAlerting::new(config.alerting.clone());
//! alerting.send_alert("Brute force", "6 failures", Severity::High, vec![], vec![]).await;
//! ```

pub mod senders;
pub mod similarity;
pub mod smtp;
pub mod types;
#[cfg(test)]
mod tests;

pub use senders::{
    AlertSender, EmailSender, MailMessage, MailTransport, PagerDutySender, SenderRegistry,
    SlackSender, SmtpTarget, WebhookSender,
};
pub use similarity::{LevenshteinSimilarity, TextSimilarity};
pub use smtp::SmtpMailTransport;
pub use types::{AlertError, AlertStats, ChannelDelivery};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::task::JoinSet;

use crate::logic::config::AlertingConfig;
use crate::logic::events::{
    AlertChannel, AlertStatus, ChannelUpdate, SecurityAlert, SecurityEvent, Severity,
};
use crate::logic::store::{set_json, KeyValueStore};

// ============================================================================
// CHANNEL PERSISTENCE
// ============================================================================

fn load_channels_from_disk(path: &Path) -> Vec<AlertChannel> {
    if !path.exists() {
        return Vec::new();
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Vec<AlertChannel>>(&content) {
            Ok(list) => {
                log::info!("Loaded {} alert channels from {}", list.len(), path.display());
                list
            }
            Err(e) => {
                log::warn!("Failed to parse {}: {}", path.display(), e);
                Vec::new()
            }
        },
        Err(e) => {
            log::warn!("Failed to read {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

fn save_channels_to_disk(path: &Path, channels: &[AlertChannel]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok();
    }
    match serde_json::to_string_pretty(channels) {
        Ok(json) => {
            if let Err(e) = fs::write(path, json) {
                log::error!("Failed to save alert channels: {}", e);
            } else {
                log::debug!("Saved {} alert channels", channels.len());
            }
        }
        Err(e) => log::error!("Failed to serialize alert channels: {}", e),
    }
}

// ============================================================================
// SECURITY ALERTING
// ============================================================================

pub struct SecurityAlerting {
    config: AlertingConfig,
    channels: RwLock<Vec<AlertChannel>>,
    history: RwLock<VecDeque<SecurityAlert>>,
    senders: SenderRegistry,
    similarity: Arc<dyn TextSimilarity>,
    mirror: Option<Arc<dyn KeyValueStore>>,
    delivery: RwLock<HashMap<String, ChannelDelivery>>,
}

impl SecurityAlerting {
    /// HTTP senders, SMTP mail transport, Levenshtein dedup
    pub fn new(config: AlertingConfig) -> Self {
        let timeout = config.channel_timeout();
        let mail: Arc<dyn MailTransport> = Arc::new(SmtpMailTransport::new(timeout));
        let senders = SenderRegistry::http(Some(mail), timeout);
        Self::with_senders(config, senders)
    }

    pub fn with_senders(config: AlertingConfig, senders: SenderRegistry) -> Self {
        let mut channels = config
            .channels_path
            .as_deref()
            .map(load_channels_from_disk)
            .unwrap_or_default();
        for chan in &config.channels {
            if !channels.iter().any(|c| c.id == chan.id) {
                channels.push(chan.clone());
            }
        }

        Self {
            config,
            channels: RwLock::new(channels),
            history: RwLock::new(VecDeque::new()),
            senders,
            similarity: Arc::new(LevenshteinSimilarity),
            mirror: None,
            delivery: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn TextSimilarity>) -> Self {
        self.similarity = similarity;
        self
    }

    /// Mirror every alert to `alert:<id>` in the keyed store
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.mirror = Some(store);
        self
    }

    // ========================================================================
    // SEND
    // ========================================================================

    /// Dedup, record and fan out. Returns the created alert, or `None` when suppressed.
    /// Channel failures are logged and counted, never returned.
    pub async fn send_alert(
        &self,
        title: &str,
        description: &str,
        severity: Severity,
        related_events: Vec<SecurityEvent>,
        recommended_actions: Vec<String>,
    ) -> Option<SecurityAlert> {
        let alert = {
            let mut history = self.history.write();
            if let Some(dup) = self.find_duplicate(&history, title, severity) {
                log::info!("Suppressed duplicate alert '{}' (matches {})", title, dup);
                return None;
            }
            let alert = SecurityAlert::new(title, description, severity, related_events, recommended_actions);
            self.record(&mut history, alert)
        };

        self.publish(&alert).await;
        Some(alert)
    }

    /// `send_alert` without the duplicate check, for alerts that each stand for a
    /// distinct record (one per incident)
    pub async fn send_distinct_alert(
        &self,
        title: &str,
        description: &str,
        severity: Severity,
        related_events: Vec<SecurityEvent>,
        recommended_actions: Vec<String>,
    ) -> SecurityAlert {
        let alert = SecurityAlert::new(title, description, severity, related_events, recommended_actions);
        let alert = self.record(&mut self.history.write(), alert);
        self.publish(&alert).await;
        alert
    }

    fn record(&self, history: &mut VecDeque<SecurityAlert>, alert: SecurityAlert) -> SecurityAlert {
        history.push_back(alert.clone());
        while history.len() > self.config.max_alert_history {
            history.pop_front();
        }
        alert
    }

    async fn publish(&self, alert: &SecurityAlert) {
        log::warn!("Security alert [{}] {}: {}", alert.severity, alert.title, alert.description);
        self.mirror_alert(alert).await;

        let channels: Vec<AlertChannel> = self.channels.read()
            .iter()
            .filter(|c| c.accepts(alert.severity))
            .cloned()
            .collect();

        if channels.is_empty() {
            log::warn!("No alert channel accepts severity {} for alert {}", alert.severity, alert.id);
            return;
        }

        self.dispatch(channels, Arc::new(alert.clone())).await;
    }

    fn find_duplicate(&self, history: &VecDeque<SecurityAlert>, title: &str, severity: Severity) -> Option<String> {
        let window = chrono::Duration::from_std(self.config.dedup_window()).ok()?;
        let cutoff = Utc::now().checked_sub_signed(window)?;

        history
            .iter()
            .rev()
            .take_while(|a| a.timestamp >= cutoff)
            .find(|a| {
                a.severity == severity
                    && self.similarity.similarity(title, &a.title) > self.config.dedup_similarity
            })
            .map(|a| a.id.clone())
    }

    /// Concurrent delivery; waits for every channel to settle
    async fn dispatch(&self, channels: Vec<AlertChannel>, alert: Arc<SecurityAlert>) {
        let timeout = self.config.channel_timeout();
        let mut tasks = JoinSet::new();

        for channel in channels {
            let Some(sender) = self.senders.get(channel.channel_type()) else {
                let err = AlertError::Configuration(format!("no sender for {}", channel.channel_type()));
                self.record_delivery(&channel, Err(&err));
                log::error!("Alert {} not delivered to {}: {}", alert.id, channel.id, err);
                continue;
            };
            let alert = alert.clone();
            tasks.spawn(async move {
                let result = deliver(sender.as_ref(), &channel, &alert, timeout).await;
                (channel, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((channel, Ok(()))) => {
                    log::info!("Alert {} delivered to {} ({})", alert.id, channel.id, channel.channel_type());
                    self.record_delivery(&channel, Ok(()));
                }
                Ok((channel, Err(e))) => {
                    log::error!("Alert {} failed on {} ({}): {}", alert.id, channel.id, channel.channel_type(), e);
                    self.record_delivery(&channel, Err(&e));
                }
                Err(e) => log::error!("Alert {} delivery task aborted: {}", alert.id, e),
            }
        }
    }

    fn record_delivery(&self, channel: &AlertChannel, result: Result<(), &AlertError>) {
        let mut delivery = self.delivery.write();
        let entry = delivery
            .entry(channel.id.clone())
            .or_insert_with(|| ChannelDelivery::new(&channel.id, channel.channel_type()));
        entry.last_attempt = Some(Utc::now());
        match result {
            Ok(()) => entry.sent += 1,
            Err(e) => {
                entry.failed += 1;
                entry.last_error = Some(e.to_string());
            }
        }
    }

    async fn mirror_alert(&self, alert: &SecurityAlert) {
        if let Some(ref store) = self.mirror {
            let key = format!("alert:{}", alert.id);
            if let Err(e) = set_json(store.as_ref(), &key, alert, self.config.retention()).await {
                log::error!("Failed to mirror alert {}: {}", alert.id, e);
            }
        }
    }

    /// Send a synthetic low-severity alert to one channel, ignoring its threshold
    pub async fn test_channel(&self, channel_id: &str) -> Result<(), AlertError> {
        let channel = self
            .get_channel(channel_id)
            .ok_or_else(|| AlertError::ChannelNotFound(channel_id.to_string()))?;
        let sender = self.senders.get(channel.channel_type()).ok_or_else(|| {
            AlertError::Configuration(format!("no sender for {}", channel.channel_type()))
        })?;

        let alert = SecurityAlert::new(
            "Test alert",
            "This is a test alert. The channel is configured correctly.",
            Severity::Low,
            Vec::new(),
            Vec::new(),
        );
        let result = deliver(sender.as_ref(), &channel, &alert, self.config.channel_timeout()).await;
        self.record_delivery(&channel, result.as_ref().map(|_| ()));
        result
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// active → acknowledged only
    pub async fn acknowledge_alert(&self, alert_id: &str, acknowledged_by: &str) -> bool {
        let updated = self.transition(alert_id, |alert| {
            if alert.status != AlertStatus::Active {
                return false;
            }
            alert.status = AlertStatus::Acknowledged;
            alert.acknowledged_by = Some(acknowledged_by.to_string());
            alert.acknowledged_at = Some(Utc::now());
            true
        });
        self.finish_transition(updated, "acknowledged").await
    }

    /// active | acknowledged → resolved
    pub async fn resolve_alert(&self, alert_id: &str, notes: Option<&str>) -> bool {
        let updated = self.transition(alert_id, |alert| {
            if alert.status.is_terminal() {
                return false;
            }
            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(Utc::now());
            alert.resolution_notes = notes.map(str::to_string);
            true
        });
        self.finish_transition(updated, "resolved").await
    }

    /// active → dismissed only
    pub async fn dismiss_alert(&self, alert_id: &str) -> bool {
        let updated = self.transition(alert_id, |alert| {
            if alert.status != AlertStatus::Active {
                return false;
            }
            alert.status = AlertStatus::Dismissed;
            alert.resolved_at = Some(Utc::now());
            true
        });
        self.finish_transition(updated, "dismissed").await
    }

    fn transition<F>(&self, alert_id: &str, apply: F) -> Option<SecurityAlert>
    where
        F: FnOnce(&mut SecurityAlert) -> bool,
    {
        let mut history = self.history.write();
        let alert = history.iter_mut().find(|a| a.id == alert_id)?;
        if apply(alert) {
            Some(alert.clone())
        } else {
            None
        }
    }

    async fn finish_transition(&self, updated: Option<SecurityAlert>, verb: &str) -> bool {
        match updated {
            Some(alert) => {
                log::info!("Alert {} {}", alert.id, verb);
                self.mirror_alert(&alert).await;
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get_alert(&self, alert_id: &str) -> Option<SecurityAlert> {
        self.history.read().iter().find(|a| a.id == alert_id).cloned()
    }

    /// Newest first
    pub fn get_alerts(&self, limit: usize) -> Vec<SecurityAlert> {
        self.history.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn get_active_alerts(&self) -> Vec<SecurityAlert> {
        self.history.read()
            .iter()
            .rev()
            .filter(|a| a.status == AlertStatus::Active)
            .cloned()
            .collect()
    }

    pub fn alert_count(&self) -> usize {
        self.history.read().len()
    }

    pub fn get_alert_stats(&self, timeframe: Duration) -> AlertStats {
        let cutoff = chrono::Duration::from_std(timeframe)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d));
        let history = self.history.read();

        let mut stats = AlertStats {
            timeframe_secs: timeframe.as_secs(),
            ..Default::default()
        };
        let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
        let mut latencies = Vec::new();

        for alert in history.iter().filter(|a| cutoff.map_or(true, |c| a.timestamp >= c)) {
            stats.total_alerts += 1;
            *by_severity.entry(alert.severity).or_insert(0) += 1;
            *stats.by_status.entry(alert.status.as_str().to_string()).or_insert(0) += 1;

            if matches!(alert.status, AlertStatus::Acknowledged | AlertStatus::Resolved) {
                if let Some(acked) = alert.acknowledged_at {
                    latencies.push(latency_secs(alert.timestamp, acked));
                }
            }
        }

        stats.by_severity = by_severity;
        if !latencies.is_empty() {
            stats.average_ack_latency_secs = Some(latencies.iter().sum::<f64>() / latencies.len() as f64);
        }
        stats
    }

    pub fn delivery_stats(&self) -> Vec<ChannelDelivery> {
        let mut list: Vec<ChannelDelivery> = self.delivery.read().values().cloned().collect();
        list.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        list
    }

    /// Purge alerts older than `retention_days`; returns the number removed
    pub fn cleanup_old_alerts(&self, retention_days: u32) -> usize {
        let Some(cutoff) = Utc::now().checked_sub_signed(chrono::Duration::days(i64::from(retention_days))) else {
            return 0;
        };

        let mut history = self.history.write();
        let before = history.len();
        history.retain(|a| a.timestamp >= cutoff);
        let removed = before - history.len();
        if removed > 0 {
            log::info!("Purged {} alerts older than {} days", removed, retention_days);
        }
        removed
    }

    /// `cleanup_old_alerts` with the configured retention
    pub fn cleanup_expired_alerts(&self) -> usize {
        self.cleanup_old_alerts(self.config.alert_retention_days)
    }

    // ========================================================================
    // CHANNELS
    // ========================================================================

    pub fn add_channel(&self, channel: AlertChannel) -> String {
        let id = channel.id.clone();
        {
            let mut channels = self.channels.write();
            channels.retain(|c| c.id != id);
            channels.push(channel);
        }
        log::info!("Alert channel {} added", id);
        self.persist_channels();
        id
    }

    pub fn remove_channel(&self, channel_id: &str) -> bool {
        let removed = {
            let mut channels = self.channels.write();
            let before = channels.len();
            channels.retain(|c| c.id != channel_id);
            before != channels.len()
        };
        if removed {
            self.delivery.write().remove(channel_id);
            self.persist_channels();
        }
        removed
    }

    pub fn update_channel(&self, channel_id: &str, update: ChannelUpdate) -> bool {
        let updated = {
            let mut channels = self.channels.write();
            match channels.iter_mut().find(|c| c.id == channel_id) {
                Some(chan) => {
                    if let Some(name) = update.name {
                        chan.name = name;
                    }
                    if let Some(enabled) = update.enabled {
                        chan.enabled = enabled;
                    }
                    if let Some(threshold) = update.severity_threshold {
                        chan.severity_threshold = threshold;
                    }
                    if let Some(config) = update.config {
                        chan.config = config;
                    }
                    true
                }
                None => false,
            }
        };
        if updated {
            self.persist_channels();
        }
        updated
    }

    pub fn get_channel(&self, channel_id: &str) -> Option<AlertChannel> {
        self.channels.read().iter().find(|c| c.id == channel_id).cloned()
    }

    pub fn get_channels(&self) -> Vec<AlertChannel> {
        self.channels.read().clone()
    }

    fn persist_channels(&self) {
        if let Some(ref path) = self.config.channels_path {
            let channels = self.channels.read().clone();
            save_channels_to_disk(path, &channels);
        }
    }
}

async fn deliver(
    sender: &dyn AlertSender,
    channel: &AlertChannel,
    alert: &SecurityAlert,
    timeout: Duration,
) -> Result<(), AlertError> {
    match tokio::time::timeout(timeout, sender.send(channel, alert)).await {
        Ok(result) => result,
        Err(_) => Err(AlertError::Timeout(timeout)),
    }
}

fn latency_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds().max(0) as f64 / 1000.0
}
