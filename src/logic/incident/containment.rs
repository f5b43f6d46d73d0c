//! Containment Actions
//!
//! Side effects of automated playbook steps. The engine only talks to the
//! `ContainmentActions` trait; `RecordingContainment` keeps everything in memory.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainmentError {
    #[error("Containment target rejected: {0}")]
    Rejected(String),

    #[error("Containment backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ContainmentActions: Send + Sync {
    async fn block_ip(&self, ip: &str, reason: &str) -> Result<(), ContainmentError>;

    async fn isolate_asset(&self, asset: &str, reason: &str) -> Result<(), ContainmentError>;

    async fn notify_stakeholders(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), ContainmentError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeholderNotice {
    pub sent_at: DateTime<Utc>,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// In-process block list, quarantine set and notification log
#[derive(Default)]
pub struct RecordingContainment {
    blocked_ips: RwLock<BTreeSet<String>>,
    isolated: RwLock<BTreeSet<String>>,
    notices: RwLock<Vec<StakeholderNotice>>,
}

impl RecordingContainment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocked_ips(&self) -> Vec<String> {
        self.blocked_ips.read().iter().cloned().collect()
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.blocked_ips.read().contains(ip)
    }

    pub fn unblock_ip(&self, ip: &str) -> bool {
        self.blocked_ips.write().remove(ip)
    }

    pub fn isolated_assets(&self) -> Vec<String> {
        self.isolated.read().iter().cloned().collect()
    }

    pub fn notices(&self) -> Vec<StakeholderNotice> {
        self.notices.read().clone()
    }
}

#[async_trait]
impl ContainmentActions for RecordingContainment {
    async fn block_ip(&self, ip: &str, reason: &str) -> Result<(), ContainmentError> {
        let ip = ip.trim();
        if ip.parse::<std::net::IpAddr>().is_err() {
            return Err(ContainmentError::Rejected(format!("not an IP address: {}", ip)));
        }
        if self.blocked_ips.write().insert(ip.to_string()) {
            log::warn!("Blocked IP {} ({})", ip, reason);
        }
        Ok(())
    }

    async fn isolate_asset(&self, asset: &str, reason: &str) -> Result<(), ContainmentError> {
        if asset.trim().is_empty() {
            return Err(ContainmentError::Rejected("empty asset".into()));
        }
        if self.isolated.write().insert(asset.to_string()) {
            log::warn!("Isolated asset {} ({})", asset, reason);
        }
        Ok(())
    }

    async fn notify_stakeholders(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), ContainmentError> {
        if recipients.is_empty() {
            return Err(ContainmentError::Rejected("no stakeholders configured".into()));
        }
        log::info!("Stakeholder notice to {}: {}", recipients.join(", "), subject);
        self.notices.write().push(StakeholderNotice {
            sent_at: Utc::now(),
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
