//! Event Types
//!
//! Core vocabulary shared by every engine.
//! KHÔNG chứa logic - chỉ data structures và lookup tables.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::generate_id;

/// Free-form, event-specific context
pub type EventDetails = Map<String, Value>;

// ============================================================================
// SEVERITY
// ============================================================================

/// Severity with a total order: Low < Medium < High < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    /// Weight used when folding anomalies into a risk score
    pub fn risk_weight(&self) -> f64 {
        match self {
            Severity::Low => 0.1,
            Severity::Medium => 0.3,
            Severity::High => 0.6,
            Severity::Critical => 1.0,
        }
    }

    /// Application log level for events of this severity
    pub fn log_level(&self) -> log::Level {
        match self {
            Severity::Critical => log::Level::Error,
            Severity::High => log::Level::Warn,
            Severity::Medium => log::Level::Info,
            Severity::Low => log::Level::Debug,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Severity::Low => "#2ecc71",
            Severity::Medium => "#f1c40f",
            Severity::High => "#e67e22",
            Severity::Critical => "#e74c3c",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

// ============================================================================
// EVENT TYPES
// ============================================================================

/// Closed set of security-relevant occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityEventType {
    #[serde(rename = "auth.login_success")]
    AuthLoginSuccess,
    #[serde(rename = "auth.login_failure")]
    AuthLoginFailure,
    #[serde(rename = "auth.logout")]
    AuthLogout,
    #[serde(rename = "auth.password_reset")]
    AuthPasswordReset,
    #[serde(rename = "auth.mfa_failure")]
    AuthMfaFailure,
    #[serde(rename = "auth.token_invalid")]
    AuthTokenInvalid,
    #[serde(rename = "auth.session_hijack_suspected")]
    AuthSessionHijack,

    #[serde(rename = "authz.access_denied")]
    AuthzAccessDenied,
    #[serde(rename = "authz.privilege_escalation")]
    AuthzPrivilegeEscalation,

    #[serde(rename = "rate_limit.exceeded")]
    RateLimitExceeded,
    #[serde(rename = "rate_limit.ip_blocked")]
    RateLimitIpBlocked,

    #[serde(rename = "payment.signature_invalid")]
    PaymentSignatureInvalid,
    #[serde(rename = "payment.fraud_suspected")]
    PaymentFraudSuspected,
    #[serde(rename = "payment.amount_mismatch")]
    PaymentAmountMismatch,
    #[serde(rename = "payment.webhook_replay")]
    PaymentWebhookReplay,

    #[serde(rename = "data.export")]
    DataExport,
    #[serde(rename = "data.bulk_delete")]
    DataBulkDelete,
    #[serde(rename = "data.sensitive_access")]
    DataSensitiveAccess,

    #[serde(rename = "input.validation_failure")]
    InputValidationFailure,
    #[serde(rename = "input.injection_attempt")]
    InputInjectionAttempt,

    #[serde(rename = "system.config_change")]
    SystemConfigChange,
    #[serde(rename = "system.error")]
    SystemError,

    #[serde(rename = "threat.intel_match")]
    ThreatIntelMatch,
    #[serde(rename = "threat.deception_triggered")]
    DeceptionAssetTriggered,
    #[serde(rename = "threat.zero_trust_violation")]
    ZeroTrustViolation,
    #[serde(rename = "behavior.anomaly")]
    BehaviorAnomaly,
}

impl SecurityEventType {
    pub const ALL: [SecurityEventType; 26] = [
        SecurityEventType::AuthLoginSuccess,
        SecurityEventType::AuthLoginFailure,
        SecurityEventType::AuthLogout,
        SecurityEventType::AuthPasswordReset,
        SecurityEventType::AuthMfaFailure,
        SecurityEventType::AuthTokenInvalid,
        SecurityEventType::AuthSessionHijack,
        SecurityEventType::AuthzAccessDenied,
        SecurityEventType::AuthzPrivilegeEscalation,
        SecurityEventType::RateLimitExceeded,
        SecurityEventType::RateLimitIpBlocked,
        SecurityEventType::PaymentSignatureInvalid,
        SecurityEventType::PaymentFraudSuspected,
        SecurityEventType::PaymentAmountMismatch,
        SecurityEventType::PaymentWebhookReplay,
        SecurityEventType::DataExport,
        SecurityEventType::DataBulkDelete,
        SecurityEventType::DataSensitiveAccess,
        SecurityEventType::InputValidationFailure,
        SecurityEventType::InputInjectionAttempt,
        SecurityEventType::SystemConfigChange,
        SecurityEventType::SystemError,
        SecurityEventType::ThreatIntelMatch,
        SecurityEventType::DeceptionAssetTriggered,
        SecurityEventType::ZeroTrustViolation,
        SecurityEventType::BehaviorAnomaly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::AuthLoginSuccess => "auth.login_success",
            SecurityEventType::AuthLoginFailure => "auth.login_failure",
            SecurityEventType::AuthLogout => "auth.logout",
            SecurityEventType::AuthPasswordReset => "auth.password_reset",
            SecurityEventType::AuthMfaFailure => "auth.mfa_failure",
            SecurityEventType::AuthTokenInvalid => "auth.token_invalid",
            SecurityEventType::AuthSessionHijack => "auth.session_hijack_suspected",
            SecurityEventType::AuthzAccessDenied => "authz.access_denied",
            SecurityEventType::AuthzPrivilegeEscalation => "authz.privilege_escalation",
            SecurityEventType::RateLimitExceeded => "rate_limit.exceeded",
            SecurityEventType::RateLimitIpBlocked => "rate_limit.ip_blocked",
            SecurityEventType::PaymentSignatureInvalid => "payment.signature_invalid",
            SecurityEventType::PaymentFraudSuspected => "payment.fraud_suspected",
            SecurityEventType::PaymentAmountMismatch => "payment.amount_mismatch",
            SecurityEventType::PaymentWebhookReplay => "payment.webhook_replay",
            SecurityEventType::DataExport => "data.export",
            SecurityEventType::DataBulkDelete => "data.bulk_delete",
            SecurityEventType::DataSensitiveAccess => "data.sensitive_access",
            SecurityEventType::InputValidationFailure => "input.validation_failure",
            SecurityEventType::InputInjectionAttempt => "input.injection_attempt",
            SecurityEventType::SystemConfigChange => "system.config_change",
            SecurityEventType::SystemError => "system.error",
            SecurityEventType::ThreatIntelMatch => "threat.intel_match",
            SecurityEventType::DeceptionAssetTriggered => "threat.deception_triggered",
            SecurityEventType::ZeroTrustViolation => "threat.zero_trust_violation",
            SecurityEventType::BehaviorAnomaly => "behavior.anomaly",
        }
    }

    /// Severity assigned when the caller does not override it
    pub fn default_severity(&self) -> Severity {
        match self {
            SecurityEventType::AuthLoginSuccess
            | SecurityEventType::AuthLogout
            | SecurityEventType::DataExport
            | SecurityEventType::InputValidationFailure
            | SecurityEventType::SystemError => Severity::Low,

            SecurityEventType::AuthLoginFailure
            | SecurityEventType::AuthPasswordReset
            | SecurityEventType::AuthMfaFailure
            | SecurityEventType::AuthTokenInvalid
            | SecurityEventType::AuthzAccessDenied
            | SecurityEventType::RateLimitExceeded
            | SecurityEventType::DataSensitiveAccess
            | SecurityEventType::SystemConfigChange
            | SecurityEventType::BehaviorAnomaly => Severity::Medium,

            SecurityEventType::RateLimitIpBlocked
            | SecurityEventType::PaymentSignatureInvalid
            | SecurityEventType::PaymentAmountMismatch
            | SecurityEventType::PaymentWebhookReplay
            | SecurityEventType::DataBulkDelete
            | SecurityEventType::InputInjectionAttempt
            | SecurityEventType::ThreatIntelMatch
            | SecurityEventType::DeceptionAssetTriggered => Severity::High,

            SecurityEventType::AuthSessionHijack
            | SecurityEventType::AuthzPrivilegeEscalation
            | SecurityEventType::PaymentFraudSuspected
            | SecurityEventType::ZeroTrustViolation => Severity::Critical,
        }
    }

    /// Top-level family ("auth", "payment", ...)
    pub fn family(&self) -> &'static str {
        self.as_str().split('.').next().unwrap_or("unknown")
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SecurityEventType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown event type: {}", s))
    }
}

// ============================================================================
// EVENT OPTIONS
// ============================================================================

/// Optional attributes supplied by the caller of `log_event`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventOptions {
    pub severity: Option<Severity>,
    pub source: Option<String>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub correlation_id: Option<String>,
    pub request_id: Option<String>,
    pub organization_id: Option<String>,
}

impl EventOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
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

    pub fn correlation(mut self, id: &str) -> Self {
        self.correlation_id = Some(id.to_string());
        self
    }

    pub fn request(mut self, id: &str) -> Self {
        self.request_id = Some(id.to_string());
        self
    }

    pub fn organization(mut self, id: &str) -> Self {
        self.organization_id = Some(id.to_string());
        self
    }
}

// ============================================================================
// SECURITY EVENT
// ============================================================================

/// Immutable, timestamped record of something security-relevant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub details: EventDetails,
}

impl SecurityEvent {
    /// Build a new event; severity falls back to the event type's default
    pub fn new(event_type: SecurityEventType, details: EventDetails, options: EventOptions) -> Self {
        Self {
            id: generate_id("evt"),
            timestamp: Utc::now(),
            event_type,
            severity: options.severity.unwrap_or_else(|| event_type.default_severity()),
            source: options.source.unwrap_or_else(|| "application".to_string()),
            user_id: options.user_id,
            ip_address: options.ip_address,
            user_agent: options.user_agent,
            correlation_id: options.correlation_id,
            request_id: options.request_id,
            organization_id: options.organization_id,
            details,
        }
    }

    /// Numeric detail; accepts JSON numbers and numeric strings
    pub fn detail_u64(&self, key: &str) -> Option<u64> {
        match self.details.get(key)? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }

    pub fn detail_bool(&self, key: &str) -> bool {
        matches!(self.details.get(key), Some(Value::Bool(true)))
    }
}
