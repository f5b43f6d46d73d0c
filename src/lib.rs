//! Security monitoring & incident-response core.
//!
//! An in-process pipeline that classifies security events, routes deduplicated
//! alerts to notification channels, keeps per-user behavioral baselines for anomaly
//! scoring, cross-checks activity against threat intel, and drives playbook-based
//! incident response.
//!
//! ## Structure
//! - `logic::events` - shared vocabulary (event types, severities, alerts, channels)
//! - `logic::store` - storage seams (event store, TTL keyed store)
//! - `logic::monitor` - event ingestion, buffering, statistics
//! - `logic::alerting` - channel fan-out, dedup, alert lifecycle
//! - `logic::behavior` - baselines, anomaly detectors, threat assessment
//! - `logic::threat` - threat intel, deception assets, zero-trust, model hooks
//! - `logic::incident` - incident classification, playbooks, automated response
//! - `logic::orchestrator` - composes everything into one pipeline
//!
//! Components are constructed once at the process root and passed to each other
//! explicitly; there is no global state.

pub mod constants;
pub mod logic;

pub use logic::alerting::SecurityAlerting;
pub use logic::behavior::BehavioralAnalytics;
pub use logic::config::SecurityConfig;
pub use logic::events::{SecurityEvent, SecurityEventType, Severity};
pub use logic::incident::IncidentResponseEngine;
pub use logic::monitor::SecurityMonitor;
pub use logic::orchestrator::SecurityPipeline;
pub use logic::threat::ThreatDetector;
