//! Zero-Trust Scoring
//!
//! Session-level access trust over a batch of actions. Starts at 1.0 and
//! deducts a penalty per risk signal; independent of the behavioral risk score.

use std::collections::BTreeSet;

use chrono::Utc;

use super::types::{AccessDecision, TrustFactor, ZeroTrustEvaluation};
use crate::logic::behavior::UserAction;
use crate::logic::config::ThreatConfig;

pub const EXTRA_IP_PENALTY: f64 = 0.2;
pub const EXTRA_USER_AGENT_PENALTY: f64 = 0.15;
pub const INTEL_MATCH_PENALTY: f64 = 0.4;
pub const DECEPTION_PENALTY: f64 = 0.5;
pub const OFF_HOURS_PENALTY: f64 = 0.1;
pub const HIGH_RISK_ACTION_PENALTY: f64 = 0.05;
pub const HIGH_RISK_ACTION_CAP: f64 = 0.2;

/// Hours (UTC, exclusive end) treated as off-hours
const OFF_HOURS: std::ops::Range<u32> = 0..6;

const HIGH_RISK_ACTIONS: &[&str] = &["data_export", "admin", "admin_action", "privilege_change", "bulk_delete"];

/// Signals gathered by the detector before scoring
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustSignals {
    pub intel_matches: usize,
    pub deception_hits: usize,
}

pub fn decide(trust_score: f64, config: &ThreatConfig) -> AccessDecision {
    if trust_score >= config.allow_threshold {
        AccessDecision::Allow
    } else if trust_score >= config.deny_threshold {
        AccessDecision::Challenge
    } else {
        AccessDecision::Deny
    }
}

pub fn evaluate(
    user_id: &str,
    actions: &[UserAction],
    signals: TrustSignals,
    config: &ThreatConfig,
) -> ZeroTrustEvaluation {
    let mut factors = Vec::new();

    let ips: BTreeSet<&str> = actions.iter().filter_map(|a| a.ip_address.as_deref()).collect();
    if ips.len() > 1 {
        let extra = (ips.len() - 1) as f64;
        factors.push(TrustFactor {
            name: "multiple_ips".into(),
            penalty: extra * EXTRA_IP_PENALTY,
            detail: format!("{} distinct source addresses", ips.len()),
        });
    }

    let agents: BTreeSet<&str> = actions.iter().filter_map(|a| a.user_agent.as_deref()).collect();
    if agents.len() > 1 {
        let extra = (agents.len() - 1) as f64;
        factors.push(TrustFactor {
            name: "multiple_devices".into(),
            penalty: extra * EXTRA_USER_AGENT_PENALTY,
            detail: format!("{} distinct user agents", agents.len()),
        });
    }

    if signals.intel_matches > 0 {
        factors.push(TrustFactor {
            name: "threat_intel".into(),
            penalty: INTEL_MATCH_PENALTY,
            detail: format!("{} threat-intel matches", signals.intel_matches),
        });
    }

    if signals.deception_hits > 0 {
        factors.push(TrustFactor {
            name: "deception".into(),
            penalty: DECEPTION_PENALTY,
            detail: format!("{} decoy interactions", signals.deception_hits),
        });
    }

    if actions.iter().any(|a| OFF_HOURS.contains(&a.hour())) {
        factors.push(TrustFactor {
            name: "off_hours".into(),
            penalty: OFF_HOURS_PENALTY,
            detail: "activity between 00:00 and 06:00 UTC".into(),
        });
    }

    let high_risk = actions
        .iter()
        .filter(|a| HIGH_RISK_ACTIONS.contains(&a.action_type.as_str()))
        .count();
    if high_risk > 0 {
        factors.push(TrustFactor {
            name: "high_risk_actions".into(),
            penalty: (high_risk as f64 * HIGH_RISK_ACTION_PENALTY).min(HIGH_RISK_ACTION_CAP),
            detail: format!("{} high-risk actions", high_risk),
        });
    }

    let penalty: f64 = factors.iter().map(|f| f.penalty).sum();
    let trust_score = (1.0 - penalty).clamp(0.0, 1.0);

    ZeroTrustEvaluation {
        user_id: user_id.to_string(),
        trust_score,
        decision: decide(trust_score, config),
        factors,
        actions_evaluated: actions.len(),
        evaluated_at: Utc::now(),
    }
}
