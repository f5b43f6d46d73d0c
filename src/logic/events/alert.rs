//! Alert & Channel Types

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::generate_id;
use super::types::{SecurityEvent, Severity};

// ============================================================================
// ALERT STATUS
// ============================================================================

/// active → acknowledged → resolved, or active → dismissed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 4] = [
        AlertStatus::Active,
        AlertStatus::Acknowledged,
        AlertStatus::Resolved,
        AlertStatus::Dismissed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Dismissed)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECURITY ALERT
// ============================================================================

/// Ops-facing notification derived from zero or more events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub related_events: Vec<SecurityEvent>,
    pub recommended_actions: Vec<String>,
    pub status: AlertStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

impl SecurityAlert {
    pub fn new(
        title: &str,
        description: &str,
        severity: Severity,
        related_events: Vec<SecurityEvent>,
        recommended_actions: Vec<String>,
    ) -> Self {
        Self {
            id: generate_id("alert"),
            title: title.to_string(),
            description: description.to_string(),
            severity,
            timestamp: Utc::now(),
            related_events,
            recommended_actions,
            status: AlertStatus::Active,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
            resolution_notes: None,
        }
    }
}

// ============================================================================
// CHANNELS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Slack,
    PagerDuty,
    Webhook,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "email",
            ChannelType::Slack => "slack",
            ChannelType::PagerDuty => "pagerduty",
            ChannelType::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings, one variant per channel type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    Email {
        smtp_host: String,
        smtp_port: u16,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        from: String,
        recipients: Vec<String>,
    },
    Slack {
        webhook_url: String,
        #[serde(default)]
        channel: Option<String>,
        #[serde(default = "default_slack_username")]
        username: String,
        #[serde(default = "default_slack_icon")]
        icon_emoji: String,
    },
    #[serde(rename = "pagerduty")]
    PagerDuty {
        integration_key: String,
    },
    Webhook {
        url: String,
        #[serde(default = "default_webhook_method")]
        method: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

fn default_slack_username() -> String {
    "Security Monitor".to_string()
}

fn default_slack_icon() -> String {
    ":rotating_light:".to_string()
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

impl ChannelConfig {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelConfig::Email { .. } => ChannelType::Email,
            ChannelConfig::Slack { .. } => ChannelType::Slack,
            ChannelConfig::PagerDuty { .. } => ChannelType::PagerDuty,
            ChannelConfig::Webhook { .. } => ChannelType::Webhook,
        }
    }
}

/// A configured alert destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub enabled: bool,
    pub severity_threshold: Severity,
    #[serde(flatten)]
    pub config: ChannelConfig,
}

impl AlertChannel {
    pub fn new(name: &str, severity_threshold: Severity, config: ChannelConfig) -> Self {
        Self {
            id: generate_id("chan"),
            name: name.to_string(),
            enabled: true,
            severity_threshold,
            config,
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        self.config.channel_type()
    }

    /// Total-order threshold check, never string equality
    pub fn accepts(&self, severity: Severity) -> bool {
        self.enabled && severity >= self.severity_threshold
    }
}

/// Partial update applied by `update_channel`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub severity_threshold: Option<Severity>,
    pub config: Option<ChannelConfig>,
}
