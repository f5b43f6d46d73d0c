//! Anomaly Detectors
//!
//! Each detector is a pure function of (action, baseline snapshot).
//! Set-based detectors stay silent until their set has at least one entry,
//! so a brand-new user never produces anomalies.

use std::net::IpAddr;

use sha2::{Digest, Sha256};

use super::types::{AnomalyRecord, AnomalyType, BehaviorBaseline, UserAction};
use crate::details;
use crate::logic::events::Severity;

pub trait AnomalyDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, action: &UserAction, baseline: &BehaviorBaseline) -> Vec<AnomalyRecord>;
}

/// The five built-in detectors
pub fn default_detectors(min_frequency_history: u64) -> Vec<Box<dyn AnomalyDetector>> {
    vec![
        Box::new(FrequencyDetector { min_history: min_frequency_history }),
        Box::new(TimingDetector),
        Box::new(LocationDetector),
        Box::new(ResourceAccessDetector),
        Box::new(DeviceFingerprintDetector),
    ]
}

// ============================================================================
// HELPERS
// ============================================================================

/// Coarse location: first two octets (IPv4) or first two hextets (IPv6)
pub fn location_of(ip: &str) -> Option<String> {
    match ip.trim().parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            Some(format!("{}.{}", o[0], o[1]))
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            Some(format!("{:x}:{:x}", s[0], s[1]))
        }
    }
}

/// Stable device fingerprint derived from the user-agent string
pub fn device_fingerprint(user_agent: &str) -> String {
    let digest = Sha256::digest(user_agent.trim().as_bytes());
    hex::encode(digest)[..16].to_string()
}

// ============================================================================
// FREQUENCY
// ============================================================================

/// A single occurrence implies a rate of 1 per action; flags it when that exceeds
/// 3x the historical per-100-actions frequency of the action type
pub struct FrequencyDetector {
    pub min_history: u64,
}

impl AnomalyDetector for FrequencyDetector {
    fn name(&self) -> &'static str {
        "frequency"
    }

    fn detect(&self, action: &UserAction, baseline: &BehaviorBaseline) -> Vec<AnomalyRecord> {
        if baseline.total_actions < self.min_history {
            return Vec::new();
        }

        let Some(pattern) = baseline.pattern(&action.action_type) else {
            return vec![AnomalyRecord::new(
                AnomalyType::Frequency,
                Severity::Medium,
                0.7,
                details!(
                    "actionType" => action.action_type,
                    "historicalFrequency" => 0,
                    "reason" => "first occurrence for an established user"
                ),
            )];
        };

        let historical_rate = pattern.frequency as f64 / 100.0;
        let current_rate = 1.0;
        if current_rate <= historical_rate * 3.0 {
            return Vec::new();
        }

        vec![AnomalyRecord::new(
            AnomalyType::Frequency,
            Severity::Low,
            (1.0 - historical_rate * 3.0).clamp(0.1, 0.6),
            details!(
                "actionType" => action.action_type,
                "historicalFrequency" => pattern.frequency,
                "currentRate" => current_rate
            ),
        )]
    }
}

// ============================================================================
// TIMING
// ============================================================================

/// Login at an hour never observed before
pub struct TimingDetector;

impl AnomalyDetector for TimingDetector {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn detect(&self, action: &UserAction, baseline: &BehaviorBaseline) -> Vec<AnomalyRecord> {
        let known = &baseline.login_patterns.typical_times;
        if !action.is_login() || known.is_empty() || known.contains(&action.hour()) {
            return Vec::new();
        }

        vec![AnomalyRecord::new(
            AnomalyType::Timing,
            Severity::Medium,
            0.6,
            details!(
                "hour" => action.hour(),
                "typicalHours" => known.iter().collect::<Vec<_>>()
            ),
        )]
    }
}

// ============================================================================
// LOCATION
// ============================================================================

/// Login from an unseen network prefix
pub struct LocationDetector;

impl AnomalyDetector for LocationDetector {
    fn name(&self) -> &'static str {
        "location"
    }

    fn detect(&self, action: &UserAction, baseline: &BehaviorBaseline) -> Vec<AnomalyRecord> {
        let known = &baseline.login_patterns.typical_locations;
        if !action.is_login() || known.is_empty() {
            return Vec::new();
        }
        let Some(ip) = action.ip_address.as_deref() else {
            return Vec::new();
        };
        let Some(location) = location_of(ip) else {
            return Vec::new();
        };
        if known.contains(&location) {
            return Vec::new();
        }

        vec![AnomalyRecord::new(
            AnomalyType::Location,
            Severity::High,
            0.7,
            details!("ipAddress" => ip, "location" => location, "knownLocations" => known.len()),
        )]
    }
}

// ============================================================================
// RESOURCE ACCESS
// ============================================================================

/// Resource outside the action type's typical set
pub struct ResourceAccessDetector;

impl AnomalyDetector for ResourceAccessDetector {
    fn name(&self) -> &'static str {
        "resource_access"
    }

    fn detect(&self, action: &UserAction, baseline: &BehaviorBaseline) -> Vec<AnomalyRecord> {
        let Some(resource) = action.resource_id.as_deref() else {
            return Vec::new();
        };
        let Some(pattern) = baseline.pattern(&action.action_type) else {
            return Vec::new();
        };
        if pattern.typical_resources.is_empty() || pattern.typical_resources.contains(resource) {
            return Vec::new();
        }

        vec![AnomalyRecord::new(
            AnomalyType::ResourceAccess,
            Severity::Medium,
            0.5,
            details!(
                "actionType" => action.action_type,
                "resourceId" => resource,
                "typicalResources" => pattern.typical_resources.len()
            ),
        )]
    }
}

// ============================================================================
// DEVICE
// ============================================================================

/// Login from an unseen user-agent fingerprint
pub struct DeviceFingerprintDetector;

impl AnomalyDetector for DeviceFingerprintDetector {
    fn name(&self) -> &'static str {
        "device_fingerprint"
    }

    fn detect(&self, action: &UserAction, baseline: &BehaviorBaseline) -> Vec<AnomalyRecord> {
        let known = &baseline.login_patterns.device_fingerprints;
        if !action.is_login() || known.is_empty() {
            return Vec::new();
        }
        let Some(ua) = action.user_agent.as_deref() else {
            return Vec::new();
        };
        let fingerprint = device_fingerprint(ua);
        if known.contains(&fingerprint) {
            return Vec::new();
        }

        vec![AnomalyRecord::new(
            AnomalyType::DeviceFingerprint,
            Severity::Medium,
            0.6,
            details!("fingerprint" => fingerprint, "userAgent" => ua),
        )]
    }
}
