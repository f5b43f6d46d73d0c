//! Threat Detector Types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::events::{generate_id, Severity};

#[derive(Debug, Error)]
pub enum ThreatError {
    #[error("Invalid behavior pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Indicator already registered: {0}")]
    DuplicateIndicator(String),

    #[error("Indicator value must not be empty")]
    EmptyIndicator,
}

// ============================================================================
// THREAT INTEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    /// Exact source IP
    Ip,
    /// Exact user-agent string
    UserAgent,
    /// Regex matched against the action type and resource id
    BehaviorPattern,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Ip => "ip",
            IndicatorKind::UserAgent => "user_agent",
            IndicatorKind::BehaviorPattern => "behavior_pattern",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatIndicator {
    pub id: String,
    pub kind: IndicatorKind,
    pub value: String,
    pub description: String,
    pub severity: Severity,
    pub added_at: DateTime<Utc>,
}

impl ThreatIndicator {
    pub fn new(kind: IndicatorKind, value: &str, description: &str) -> Self {
        Self {
            id: generate_id("ioc"),
            kind,
            value: value.trim().to_string(),
            description: description.to_string(),
            severity: Severity::High,
            added_at: Utc::now(),
        }
    }
}

// ============================================================================
// DECEPTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeceptionAssetType {
    Endpoint,
    File,
    Credential,
    Database,
}

impl DeceptionAssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeceptionAssetType::Endpoint => "endpoint",
            DeceptionAssetType::File => "file",
            DeceptionAssetType::Credential => "credential",
            DeceptionAssetType::Database => "database",
        }
    }
}

/// One interaction with a decoy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeceptionTrigger {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub action_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Decoy resource: any access to `location` is suspicious
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeceptionAsset {
    pub id: String,
    pub asset_type: DeceptionAssetType,
    pub name: String,
    pub location: String,
    pub deployed_at: DateTime<Utc>,
    pub triggered: Vec<DeceptionTrigger>,
}

impl DeceptionAsset {
    pub fn new(asset_type: DeceptionAssetType, name: &str, location: &str) -> Self {
        Self {
            id: generate_id("decoy"),
            asset_type,
            name: name.to_string(),
            location: location.to_string(),
            deployed_at: Utc::now(),
            triggered: Vec::new(),
        }
    }
}

// ============================================================================
// ZERO TRUST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    Challenge,
    Deny,
}

impl AccessDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessDecision::Allow => "allow",
            AccessDecision::Challenge => "challenge",
            AccessDecision::Deny => "deny",
        }
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One deduction from the trust score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustFactor {
    pub name: String,
    pub penalty: f64,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZeroTrustEvaluation {
    pub user_id: String,
    pub trust_score: f64,
    pub decision: AccessDecision,
    pub factors: Vec<TrustFactor>,
    pub actions_evaluated: usize,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatStats {
    pub indicators: usize,
    pub deception_assets: usize,
    pub triggered_assets: usize,
    pub total_triggers: usize,
    pub models: Vec<String>,
}
