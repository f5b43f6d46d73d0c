//! Incident Types
//!
//! Status machine, category tables and the incident record itself.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::logic::events::{generate_id, SecurityEventType, Severity};
use crate::logic::store::StoreError;

#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("Incident not found: {0}")]
    NotFound(String),

    #[error("Incident already closed: {0}")]
    AlreadyClosed(String),

    #[error("Incident store error: {0}")]
    Store(#[from] StoreError),
}

// ============================================================================
// STATUS
// ============================================================================

/// Default path: detected → investigating → contained → eradicated → recovered → closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Detected,
    Investigating,
    Contained,
    Eradicated,
    Recovered,
    Closed,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Detected => "detected",
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Contained => "contained",
            IncidentStatus::Eradicated => "eradicated",
            IncidentStatus::Recovered => "recovered",
            IncidentStatus::Closed => "closed",
        }
    }

    pub fn is_open(&self) -> bool {
        *self != IncidentStatus::Closed
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CATEGORY TABLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCategory {
    UnauthorizedAccess,
    AccountCompromise,
    DataBreach,
    PaymentFraud,
    DenialOfService,
    InsiderThreat,
    SystemCompromise,
    PolicyViolation,
}

impl IncidentCategory {
    pub const ALL: [IncidentCategory; 8] = [
        IncidentCategory::UnauthorizedAccess,
        IncidentCategory::AccountCompromise,
        IncidentCategory::DataBreach,
        IncidentCategory::PaymentFraud,
        IncidentCategory::DenialOfService,
        IncidentCategory::InsiderThreat,
        IncidentCategory::SystemCompromise,
        IncidentCategory::PolicyViolation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentCategory::UnauthorizedAccess => "unauthorized_access",
            IncidentCategory::AccountCompromise => "account_compromise",
            IncidentCategory::DataBreach => "data_breach",
            IncidentCategory::PaymentFraud => "payment_fraud",
            IncidentCategory::DenialOfService => "denial_of_service",
            IncidentCategory::InsiderThreat => "insider_threat",
            IncidentCategory::SystemCompromise => "system_compromise",
            IncidentCategory::PolicyViolation => "policy_violation",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            IncidentCategory::UnauthorizedAccess => "Unauthorized access attempt",
            IncidentCategory::AccountCompromise => "Suspected account compromise",
            IncidentCategory::DataBreach => "Potential data breach",
            IncidentCategory::PaymentFraud => "Payment fraud",
            IncidentCategory::DenialOfService => "Denial of service",
            IncidentCategory::InsiderThreat => "Insider threat",
            IncidentCategory::SystemCompromise => "System compromise",
            IncidentCategory::PolicyViolation => "Security policy violation",
        }
    }

    /// Event types that can open an incident; anything else is ignored
    pub fn from_event_type(event_type: SecurityEventType) -> Option<Self> {
        use SecurityEventType as T;
        let category = match event_type {
            T::AuthLoginFailure | T::AuthMfaFailure | T::AuthTokenInvalid | T::AuthzAccessDenied => {
                IncidentCategory::UnauthorizedAccess
            }
            T::ThreatIntelMatch => IncidentCategory::UnauthorizedAccess,
            T::AuthSessionHijack | T::AuthPasswordReset | T::ZeroTrustViolation | T::BehaviorAnomaly => {
                IncidentCategory::AccountCompromise
            }
            T::DataExport | T::DataBulkDelete | T::DataSensitiveAccess => IncidentCategory::DataBreach,
            T::PaymentSignatureInvalid
            | T::PaymentFraudSuspected
            | T::PaymentAmountMismatch
            | T::PaymentWebhookReplay => IncidentCategory::PaymentFraud,
            T::RateLimitExceeded | T::RateLimitIpBlocked => IncidentCategory::DenialOfService,
            T::DeceptionAssetTriggered => IncidentCategory::InsiderThreat,
            T::AuthzPrivilegeEscalation | T::InputInjectionAttempt => IncidentCategory::SystemCompromise,
            T::SystemConfigChange => IncidentCategory::PolicyViolation,
            T::AuthLoginSuccess | T::AuthLogout | T::InputValidationFailure | T::SystemError => return None,
        };
        Some(category)
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            IncidentCategory::DataBreach | IncidentCategory::SystemCompromise => Severity::Critical,
            IncidentCategory::AccountCompromise
            | IncidentCategory::PaymentFraud
            | IncidentCategory::InsiderThreat => Severity::High,
            IncidentCategory::UnauthorizedAccess | IncidentCategory::DenialOfService => Severity::Medium,
            IncidentCategory::PolicyViolation => Severity::Low,
        }
    }

    /// Remediation checklist attached to every new incident of this category
    pub fn remediation_steps(&self) -> &'static [&'static str] {
        match self {
            IncidentCategory::UnauthorizedAccess => &[
                "Block offending source addresses",
                "Force password reset for targeted accounts",
                "Review authentication logs for successful logins",
                "Enable MFA for affected users",
            ],
            IncidentCategory::AccountCompromise => &[
                "Revoke all active sessions",
                "Reset credentials and API keys",
                "Review recent account activity",
                "Contact the account owner out of band",
            ],
            IncidentCategory::DataBreach => &[
                "Identify the scope of exposed data",
                "Revoke access paths used for exfiltration",
                "Preserve evidence for legal review",
                "Prepare regulatory and customer notifications",
            ],
            IncidentCategory::PaymentFraud => &[
                "Freeze affected payment methods",
                "Reconcile transactions with the payment provider",
                "Rotate webhook signing secrets",
                "Review refunds and chargebacks",
            ],
            IncidentCategory::DenialOfService => &[
                "Enable upstream rate limiting",
                "Block abusive address ranges",
                "Scale affected services",
            ],
            IncidentCategory::InsiderThreat => &[
                "Restrict the user's privileges",
                "Preserve the user's activity logs",
                "Involve HR and legal",
            ],
            IncidentCategory::SystemCompromise => &[
                "Isolate affected hosts",
                "Patch the exploited vulnerability",
                "Rebuild compromised systems from clean images",
                "Rotate all secrets reachable from affected hosts",
            ],
            IncidentCategory::PolicyViolation => &[
                "Review the change with its owner",
                "Revert unapproved configuration",
            ],
        }
    }
}

impl fmt::Display for IncidentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TIMELINE & EVIDENCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl TimelineEntry {
    pub fn new(action: &str, actor: &str, details: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.to_string(),
            actor: actor.to_string(),
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    SystemSnapshot,
    LogSnapshot,
    SourceEvent,
}

/// Collected artifact; `sha256` is the digest of the serialized payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: String,
    pub kind: EvidenceKind,
    pub description: String,
    pub collected_at: DateTime<Utc>,
    pub sha256: String,
    pub payload: Value,
}

impl Evidence {
    pub fn new(kind: EvidenceKind, description: &str, payload: Value) -> Self {
        Self {
            id: generate_id("evd"),
            kind,
            description: description.to_string(),
            collected_at: Utc::now(),
            sha256: digest(&payload),
            payload,
        }
    }

    /// Payload still matches the recorded digest
    pub fn verify(&self) -> bool {
        digest(&self.payload) == self.sha256
    }
}

fn digest(payload: &Value) -> String {
    hex::encode(Sha256::digest(payload.to_string().as_bytes()))
}

// ============================================================================
// INCIDENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: IncidentCategory,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_events: Vec<String>,
    /// `user:`, `ip:`, `resource:` and `system:` tags
    pub affected_assets: Vec<String>,
    /// Roles engaged on this incident, taken from the category playbook
    #[serde(default)]
    pub response_team: BTreeSet<String>,
    pub remediation_steps: Vec<String>,
    pub timeline: Vec<TimelineEntry>,
    pub evidence: Vec<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lessons_learned: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn log(&mut self, action: &str, actor: &str, details: Option<String>) {
        self.timeline.push(TimelineEntry::new(action, actor, details));
        self.updated_at = Utc::now();
    }

    pub fn assets_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.affected_assets
            .iter()
            .filter_map(move |tag| tag.strip_prefix(prefix))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentStats {
    pub total: usize,
    pub open: usize,
    pub by_status: BTreeMap<IncidentStatus, usize>,
    pub by_category: BTreeMap<IncidentCategory, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
}
