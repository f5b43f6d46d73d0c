//! Behavioral Analytics Types

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::events::{generate_id, EventDetails, Severity};
use crate::logic::store::StoreError;

#[derive(Debug, Error)]
pub enum BehaviorError {
    #[error("Behavior store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid user action: {0}")]
    InvalidAction(String),
}

// ============================================================================
// USER ACTION
// ============================================================================

/// One observed user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    pub id: String,
    pub user_id: String,
    pub action_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub metadata: EventDetails,
}

impl UserAction {
    pub fn new(user_id: &str, action_type: &str) -> Self {
        Self {
            id: generate_id("act"),
            user_id: user_id.to_string(),
            action_type: action_type.to_string(),
            timestamp: Utc::now(),
            ip_address: None,
            user_agent: None,
            resource_id: None,
            session_id: None,
            duration_ms: None,
            metadata: EventDetails::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.ip_address = Some(ip.to_string());
        self
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    pub fn resource(mut self, resource_id: &str) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Hour of day (UTC, 0-23)
    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }

    pub fn is_login(&self) -> bool {
        self.action_type == "login"
    }
}

// ============================================================================
// BASELINE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPattern {
    pub frequency: u64,
    pub time_of_day: BTreeSet<u32>,
    pub typical_resources: BTreeSet<String>,
    /// Running mean of `duration_ms`
    pub average_duration: f64,
    #[serde(default)]
    pub duration_samples: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPatterns {
    pub typical_times: BTreeSet<u32>,
    pub typical_locations: BTreeSet<String>,
    pub device_fingerprints: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskProfile {
    pub baseline_risk: f64,
    /// Exponentially decayed activity signal, never negative
    pub recent_activity_score: f64,
    pub anomaly_history: Vec<AnomalyRecord>,
}

/// Per-user profile of normal behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorBaseline {
    pub user_id: String,
    pub action_patterns: HashMap<String, ActionPattern>,
    pub login_patterns: LoginPatterns,
    pub risk_profile: RiskProfile,
    pub total_actions: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BehaviorBaseline {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            action_patterns: HashMap::new(),
            login_patterns: LoginPatterns::default(),
            risk_profile: RiskProfile::default(),
            total_actions: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pattern(&self, action_type: &str) -> Option<&ActionPattern> {
        self.action_patterns.get(action_type)
    }
}

// ============================================================================
// ANOMALIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Frequency,
    Timing,
    Location,
    ResourceAccess,
    DeviceFingerprint,
    /// Tag of a detector registered at runtime
    Custom(String),
}

impl AnomalyType {
    pub fn as_str(&self) -> &str {
        match self {
            AnomalyType::Frequency => "frequency",
            AnomalyType::Timing => "timing",
            AnomalyType::Location => "location",
            AnomalyType::ResourceAccess => "resource_access",
            AnomalyType::DeviceFingerprint => "device_fingerprint",
            AnomalyType::Custom(tag) => tag.as_str(),
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub timestamp: DateTime<Utc>,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// 0..=1
    pub confidence: f64,
    #[serde(default)]
    pub details: EventDetails,
}

impl AnomalyRecord {
    pub fn new(anomaly_type: AnomalyType, severity: Severity, confidence: f64, details: EventDetails) -> Self {
        Self {
            timestamp: Utc::now(),
            anomaly_type,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            details,
        }
    }
}

// ============================================================================
// THREAT ASSESSMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    /// Above the anomaly threshold
    Elevated,
    /// Above the high-risk threshold
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "normal",
            RiskLevel::Elevated => "elevated",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatAssessment {
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub action_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub anomalies: Vec<AnomalyRecord>,
    pub recommendations: Vec<String>,
    pub requires_immediate_action: bool,
}

impl ThreatAssessment {
    /// Highest anomaly severity, Low when there are none
    pub fn max_severity(&self) -> Severity {
        self.anomalies
            .iter()
            .map(|a| a.severity)
            .max()
            .unwrap_or(Severity::Low)
    }
}

/// Counters for status reports
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorStats {
    pub cached_baselines: usize,
    pub actions_recorded: u64,
    pub anomalies_detected: u64,
    pub assessments_generated: u64,
    pub failures: u64,
    pub detectors: Vec<String>,
}
