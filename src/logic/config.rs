//! Security Configuration
//!
//! Every tunable of the pipeline, grouped per engine.
//! Loaded from defaults, then an optional JSON file, then `SECMON_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;
use crate::logic::events::AlertChannel;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    Env { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub event_retention_days: u32,
    pub max_event_buffer: usize,
    pub flush_interval_secs: u64,
    /// `details.attempts` above this raises an immediate alert
    pub login_failure_alert_threshold: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            event_retention_days: DEFAULT_EVENT_RETENTION_DAYS,
            max_event_buffer: DEFAULT_MAX_EVENT_BUFFER,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            login_failure_alert_threshold: IMMEDIATE_ALERT_LOGIN_FAILURES,
        }
    }
}

impl MonitorConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn retention(&self) -> Duration {
        days(self.event_retention_days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub alert_retention_days: u32,
    pub max_alert_history: usize,
    pub dedup_window_secs: u64,
    pub dedup_similarity: f64,
    pub channel_timeout_secs: u64,
    /// Channels configured at start-up
    pub channels: Vec<AlertChannel>,
    /// Channel list persisted here when set
    pub channels_path: Option<PathBuf>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            alert_retention_days: DEFAULT_ALERT_RETENTION_DAYS,
            max_alert_history: DEFAULT_MAX_ALERT_HISTORY,
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            dedup_similarity: DEFAULT_DEDUP_SIMILARITY,
            channel_timeout_secs: DEFAULT_CHANNEL_TIMEOUT_SECS,
            channels: Vec::new(),
            channels_path: None,
        }
    }
}

impl AlertingConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.channel_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        days(self.alert_retention_days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub anomaly_threshold: f64,
    pub high_risk_threshold: f64,
    pub baseline_ttl_days: u32,
    pub action_ttl_hours: u32,
    pub assessment_ttl_days: u32,
    /// Actions a user needs before the frequency detector runs
    pub min_frequency_history: u64,
    pub max_anomaly_history: usize,
    /// In-process cache lifetime; never longer than the baseline TTL
    pub baseline_cache_secs: u64,
    pub max_cached_baselines: usize,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD,
            high_risk_threshold: DEFAULT_HIGH_RISK_THRESHOLD,
            baseline_ttl_days: DEFAULT_BASELINE_TTL_DAYS,
            action_ttl_hours: DEFAULT_ACTION_TTL_HOURS,
            assessment_ttl_days: DEFAULT_ASSESSMENT_TTL_DAYS,
            min_frequency_history: 10,
            max_anomaly_history: 50,
            baseline_cache_secs: DEFAULT_BASELINE_CACHE_SECS,
            max_cached_baselines: DEFAULT_MAX_CACHED_BASELINES,
        }
    }
}

impl BehaviorConfig {
    pub fn baseline_ttl(&self) -> Duration {
        days(self.baseline_ttl_days)
    }

    pub fn baseline_cache_ttl(&self) -> Duration {
        let cache = Duration::from_secs(self.baseline_cache_secs);
        match self.baseline_ttl() {
            ttl if ttl.is_zero() => cache,
            ttl => cache.min(ttl),
        }
    }

    pub fn action_ttl(&self) -> Duration {
        hours(self.action_ttl_hours)
    }

    pub fn assessment_ttl(&self) -> Duration {
        days(self.assessment_ttl_days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    /// Trust score at or above which access is allowed
    pub allow_threshold: f64,
    /// Trust score below which access is denied
    pub deny_threshold: f64,
    pub deploy_default_decoys: bool,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            allow_threshold: 0.6,
            deny_threshold: 0.3,
            deploy_default_decoys: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentConfig {
    pub escalation_attempts: u64,
    pub stakeholders: Vec<String>,
    /// Run automated playbook steps on creation
    pub auto_response: bool,
}

impl Default for IncidentConfig {
    fn default() -> Self {
        Self {
            escalation_attempts: DEFAULT_ESCALATION_ATTEMPTS,
            stakeholders: DEFAULT_STAKEHOLDERS.iter().map(|s| s.to_string()).collect(),
            auto_response: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database; the daemon falls back to `store::default_database_path()`
    pub database_path: Option<PathBuf>,
}

// ============================================================================
// SECURITY CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub monitor: MonitorConfig,
    pub alerting: AlertingConfig,
    pub behavior: BehaviorConfig,
    pub threat: ThreatConfig,
    pub incident: IncidentConfig,
    pub storage: StorageConfig,
}

impl SecurityConfig {
    /// Defaults → `SECMON_CONFIG` file → `SECMON_*` env, then validate
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env_string("SECMON_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(env_string)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `SECMON_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value.parse().map_err(|_| ConfigError::Env { key: key.to_string(), value })
        }

        macro_rules! override_field {
            ($key:literal, $field:expr) => {
                if let Some(v) = get($key) {
                    $field = parse($key, v)?;
                }
            };
        }

        override_field!("SECMON_EVENT_RETENTION_DAYS", self.monitor.event_retention_days);
        override_field!("SECMON_MAX_EVENT_BUFFER", self.monitor.max_event_buffer);
        override_field!("SECMON_FLUSH_INTERVAL_SECS", self.monitor.flush_interval_secs);
        override_field!("SECMON_ALERT_RETENTION_DAYS", self.alerting.alert_retention_days);
        override_field!("SECMON_MAX_ALERT_HISTORY", self.alerting.max_alert_history);
        override_field!("SECMON_DEDUP_WINDOW_SECS", self.alerting.dedup_window_secs);
        override_field!("SECMON_DEDUP_SIMILARITY", self.alerting.dedup_similarity);
        override_field!("SECMON_CHANNEL_TIMEOUT_SECS", self.alerting.channel_timeout_secs);
        override_field!("SECMON_ANOMALY_THRESHOLD", self.behavior.anomaly_threshold);
        override_field!("SECMON_HIGH_RISK_THRESHOLD", self.behavior.high_risk_threshold);
        override_field!("SECMON_BASELINE_CACHE_SECS", self.behavior.baseline_cache_secs);
        override_field!("SECMON_ESCALATION_ATTEMPTS", self.incident.escalation_attempts);
        override_field!("SECMON_AUTO_RESPONSE", self.incident.auto_response);

        if let Some(list) = get("SECMON_STAKEHOLDERS") {
            self.incident.stakeholders = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(path) = get("SECMON_CHANNELS_PATH") {
            self.alerting.channels_path = Some(PathBuf::from(path));
        }
        if let Some(path) = get("SECMON_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{} must be within [0, 1], got {}", name, v)))
            }
        };

        unit("dedup_similarity", self.alerting.dedup_similarity)?;
        unit("anomaly_threshold", self.behavior.anomaly_threshold)?;
        unit("high_risk_threshold", self.behavior.high_risk_threshold)?;
        unit("allow_threshold", self.threat.allow_threshold)?;
        unit("deny_threshold", self.threat.deny_threshold)?;

        if self.behavior.high_risk_threshold < self.behavior.anomaly_threshold {
            return Err(ConfigError::Invalid(
                "high_risk_threshold must not be below anomaly_threshold".into(),
            ));
        }
        if self.threat.allow_threshold < self.threat.deny_threshold {
            return Err(ConfigError::Invalid(
                "allow_threshold must not be below deny_threshold".into(),
            ));
        }
        if self.monitor.max_event_buffer == 0 || self.alerting.max_alert_history == 0 {
            return Err(ConfigError::Invalid("buffer and history caps must be non-zero".into()));
        }
        if self.monitor.flush_interval_secs == 0 {
            return Err(ConfigError::Invalid("flush_interval_secs must be non-zero".into()));
        }
        if self.alerting.channel_timeout_secs == 0 {
            return Err(ConfigError::Invalid("channel_timeout_secs must be non-zero".into()));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SecurityConfig::default();
        assert_eq!(config.monitor.event_retention_days, 30);
        assert_eq!(config.alerting.max_alert_history, 1000);
        assert_eq!(config.alerting.dedup_window(), Duration::from_secs(300));
        assert_eq!(config.behavior.anomaly_threshold, 0.7);
        assert_eq!(config.behavior.high_risk_threshold, 0.85);
        assert_eq!(config.behavior.baseline_ttl(), Duration::from_secs(30 * 86_400));
        assert_eq!(config.behavior.action_ttl(), Duration::from_secs(24 * 3_600));
        assert_eq!(config.behavior.baseline_cache_ttl(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SecurityConfig::default();
        config
            .apply_overrides(lookup(&[
                ("SECMON_DEDUP_WINDOW_SECS", "60"),
                ("SECMON_ANOMALY_THRESHOLD", "0.5"),
                ("SECMON_STAKEHOLDERS", "soc@corp, , ciso@corp"),
                ("SECMON_AUTO_RESPONSE", "false"),
                ("SECMON_DATABASE_PATH", "/tmp/secmon.db"),
            ]))
            .unwrap();

        assert_eq!(config.alerting.dedup_window_secs, 60);
        assert_eq!(config.behavior.anomaly_threshold, 0.5);
        assert_eq!(config.incident.stakeholders, vec!["soc@corp", "ciso@corp"]);
        assert!(!config.incident.auto_response);
        assert_eq!(config.storage.database_path, Some(PathBuf::from("/tmp/secmon.db")));
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = SecurityConfig::default();
        let err = config
            .apply_overrides(lookup(&[("SECMON_MAX_EVENT_BUFFER", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut config = SecurityConfig::default();
        config.behavior.high_risk_threshold = 0.5;
        assert!(config.validate().is_err());

        let mut config = SecurityConfig::default();
        config.alerting.dedup_similarity = 1.5;
        assert!(config.validate().is_err());

        let mut config = SecurityConfig::default();
        config.monitor.max_event_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secmon.json");
        std::fs::write(
            &path,
            r#"{
                "alerting": {
                    "dedup_window_secs": 120,
                    "channels": [{
                        "id": "chan_slack",
                        "enabled": true,
                        "severityThreshold": "high",
                        "type": "slack",
                        "webhook_url": "https://hooks.slack.test/x"
                    }]
                },
                "incident": { "escalation_attempts": 3 }
            }"#,
        )
        .unwrap();

        let config = SecurityConfig::from_file(&path).unwrap();
        assert_eq!(config.alerting.dedup_window_secs, 120);
        assert_eq!(config.alerting.channels.len(), 1);
        assert_eq!(config.incident.escalation_attempts, 3);
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut config = SecurityConfig::default();
        config.threat.deploy_default_decoys = false;
        config.save(&path).unwrap();
        assert_eq!(SecurityConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = SecurityConfig::from_file(Path::new("/nonexistent/secmon.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
