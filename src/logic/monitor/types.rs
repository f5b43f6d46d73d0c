//! Monitor Types

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::events::{SecurityEvent, SecurityEventType, Severity};

// ============================================================================
// IMMEDIATE ALERT RULES
// ============================================================================

/// Hard-coded conditions that warrant an alert the moment an event is logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ImmediateAlertReason {
    CriticalSeverity,
    RepeatedLoginFailures { attempts: u64 },
    IpAutoBlocked,
    PaymentFraudSuspected,
}

impl ImmediateAlertReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImmediateAlertReason::CriticalSeverity => "critical_severity",
            ImmediateAlertReason::RepeatedLoginFailures { .. } => "repeated_login_failures",
            ImmediateAlertReason::IpAutoBlocked => "ip_auto_blocked",
            ImmediateAlertReason::PaymentFraudSuspected => "payment_fraud_suspected",
        }
    }

    pub fn title(&self, event: &SecurityEvent) -> String {
        match self {
            ImmediateAlertReason::CriticalSeverity => {
                format!("Critical security event: {}", event.event_type)
            }
            ImmediateAlertReason::RepeatedLoginFailures { .. } => {
                "Repeated login failures detected".to_string()
            }
            ImmediateAlertReason::IpAutoBlocked => "IP address automatically blocked".to_string(),
            ImmediateAlertReason::PaymentFraudSuspected => "Suspected payment fraud".to_string(),
        }
    }

    pub fn description(&self, event: &SecurityEvent) -> String {
        let who = event.user_id.as_deref().unwrap_or("unknown user");
        let from = event.ip_address.as_deref().unwrap_or("unknown address");
        match self {
            ImmediateAlertReason::CriticalSeverity => {
                format!("{} for {} from {} (source: {})", event.event_type, who, from, event.source)
            }
            ImmediateAlertReason::RepeatedLoginFailures { attempts } => {
                format!("{} failed login attempts for {} from {}", attempts, who, from)
            }
            ImmediateAlertReason::IpAutoBlocked => {
                format!("{} was blocked by the rate limiter", from)
            }
            ImmediateAlertReason::PaymentFraudSuspected => {
                format!("Payment fraud suspected for {} from {}", who, from)
            }
        }
    }

    pub fn recommended_actions(&self) -> Vec<String> {
        let actions: &[&str] = match self {
            ImmediateAlertReason::CriticalSeverity => &[
                "Investigate the event immediately",
                "Review related activity for the user and address",
            ],
            ImmediateAlertReason::RepeatedLoginFailures { .. } => &[
                "Lock the targeted account",
                "Block the source IP address",
                "Check for credential stuffing across other accounts",
            ],
            ImmediateAlertReason::IpAutoBlocked => &[
                "Confirm the block is not a false positive",
                "Review traffic from the address before the block",
            ],
            ImmediateAlertReason::PaymentFraudSuspected => &[
                "Hold the affected transactions",
                "Contact the payment provider",
                "Review the customer's recent orders",
            ],
        };
        actions.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for ImmediateAlertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImmediateAlertReason::RepeatedLoginFailures { attempts } => {
                write!(f, "{} ({} attempts)", self.as_str(), attempts)
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

// ============================================================================
// QUERY
// ============================================================================

/// Optional filters for `get_recent_events`
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub severity: Option<Severity>,
    pub event_type: Option<SecurityEventType>,
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    /// Only events newer than now minus this
    pub timeframe: Option<Duration>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn event_type(mut self, event_type: SecurityEventType) -> Self {
        self.event_type = Some(event_type);
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

    pub fn timeframe(mut self, timeframe: Duration) -> Self {
        self.timeframe = Some(timeframe);
        self
    }

    pub(crate) fn matches(&self, event: &SecurityEvent, cutoff: Option<DateTime<Utc>>) -> bool {
        if let Some(sev) = self.severity {
            if event.severity != sev {
                return false;
            }
        }
        if let Some(t) = self.event_type {
            if event.event_type != t {
                return false;
            }
        }
        if let Some(ref user) = self.user_id {
            if event.user_id.as_deref() != Some(user.as_str()) {
                return false;
            }
        }
        if let Some(ref ip) = self.ip_address {
            if event.ip_address.as_deref() != Some(ip.as_str()) {
                return false;
            }
        }
        match cutoff {
            Some(c) => event.timestamp >= c,
            None => true,
        }
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStatistics {
    pub timeframe_secs: u64,
    pub total_events: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub unique_users: usize,
    pub unique_ips: usize,
}

/// Buffer occupancy, for status reports
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    pub buffered_events: usize,
    pub pending_flush: usize,
    pub last_flush: Option<DateTime<Utc>>,
}
