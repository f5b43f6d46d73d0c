//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! `SecurityConfig::default()` reads from here; environment overrides go through
//! the helpers at the bottom of this file.

use std::time::Duration;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "secmon";

/// Directory name under the platform data dir
pub const DATA_DIR_NAME: &str = "secmon";

// ============================================
// Security Monitor
// ============================================

/// Events older than this are evicted from the buffer and the event store
pub const DEFAULT_EVENT_RETENTION_DAYS: u32 = 30;

/// Maximum number of events kept in the in-memory buffer
pub const DEFAULT_MAX_EVENT_BUFFER: usize = 10_000;

/// Periodic flush / cleanup interval (seconds)
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;

/// Failed login count above which an immediate alert is raised
pub const IMMEDIATE_ALERT_LOGIN_FAILURES: u64 = 5;

// ============================================
// Security Alerting
// ============================================

/// Alerts older than this are purged by `cleanup_old_alerts`
pub const DEFAULT_ALERT_RETENTION_DAYS: u32 = 90;

/// Maximum number of alerts kept in history
pub const DEFAULT_MAX_ALERT_HISTORY: usize = 1000;

/// Window in which near-identical alerts are suppressed (seconds)
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 300;

/// Title similarity above which two alerts are considered duplicates
pub const DEFAULT_DEDUP_SIMILARITY: f64 = 0.8;

/// Upper bound for a single channel delivery (seconds)
pub const DEFAULT_CHANNEL_TIMEOUT_SECS: u64 = 10;

/// PagerDuty Events API v2 endpoint
pub const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

// ============================================
// Behavioral Analytics
// ============================================

/// Risk score above which an assessment is logged as anomalous
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 0.7;

/// Risk score above which immediate action is recommended
pub const DEFAULT_HIGH_RISK_THRESHOLD: f64 = 0.85;

/// Baseline TTL in the keyed store (days)
pub const DEFAULT_BASELINE_TTL_DAYS: u32 = 30;

/// Raw user action TTL in the keyed store (hours)
pub const DEFAULT_ACTION_TTL_HOURS: u32 = 24;

/// Threat assessment TTL in the keyed store (days)
pub const DEFAULT_ASSESSMENT_TTL_DAYS: u32 = 7;

/// How long an in-process baseline is trusted before the keyed store is re-read (seconds)
pub const DEFAULT_BASELINE_CACHE_SECS: u64 = 300;

/// Cap on in-process cached baselines
pub const DEFAULT_MAX_CACHED_BASELINES: usize = 10_000;

/// Multiplicative decay applied to the recent activity score on every update
pub const ACTIVITY_DECAY: f64 = 0.95;

// ============================================
// Incident Response
// ============================================

/// `details.attempts` above this value escalates to an incident
pub const DEFAULT_ESCALATION_ATTEMPTS: u64 = 5;

/// Default stakeholder distribution list
pub const DEFAULT_STAKEHOLDERS: &[&str] = &["security-team@localhost", "it-ops@localhost"];

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Read a string from the environment
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Days as a `Duration`
pub fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 86_400)
}

/// Hours as a `Duration`
pub fn hours(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 3_600)
}
