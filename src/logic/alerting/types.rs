//! Alerting Types

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::events::{ChannelType, Severity};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{channel} responded with HTTP {status}")]
    HttpStatus { channel: ChannelType, status: u16 },

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Mail transport error: {0}")]
    Mail(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),
}

impl From<reqwest::Error> for AlertError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            AlertError::Configuration(e.to_string())
        } else {
            AlertError::Network(e.to_string())
        }
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub timeframe_secs: u64,
    pub total_alerts: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_status: BTreeMap<String, usize>,
    /// Mean create-to-acknowledge latency, in seconds
    pub average_ack_latency_secs: Option<f64>,
}

/// Per-channel delivery counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDelivery {
    pub channel_id: String,
    pub channel_type: ChannelType,
    pub sent: u64,
    pub failed: u64,
    pub last_error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl ChannelDelivery {
    pub fn new(channel_id: &str, channel_type: ChannelType) -> Self {
        Self {
            channel_id: channel_id.to_string(),
            channel_type,
            sent: 0,
            failed: 0,
            last_error: None,
            last_attempt: None,
        }
    }
}
