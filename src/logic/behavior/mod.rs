//! Behavioral Analytics Module
//!
//! Per-user rolling baselines of action frequency, timing, location and device,
//! scored by a pluggable set of anomaly detectors.
//!
//! # Pipeline (per action)
//! 1. Persist the raw action (action TTL)
//! 2. Load or create the user's baseline
//! 3. Run detectors against the baseline as it was before this action
//! 4. Fold the action into the baseline, decay the activity score, persist (baseline TTL)
//! 5. If anything fired, build a `ThreatAssessment` and persist it (assessment TTL)
//!
//! `record_user_action` never fails; store errors are logged and counted.
//!
//! Baselines are cached in-process for at most `baseline_cache_ttl()`, after which
//! the keyed store (and its TTL) is authoritative again. `evict_stale` drops expired
//! cache entries and idle per-user locks.

pub mod detectors;
pub mod types;

pub use detectors::{default_detectors, device_fingerprint, location_of, AnomalyDetector};
pub use types::{
    ActionPattern, AnomalyRecord, AnomalyType, BehaviorBaseline, BehaviorError, BehaviorStats,
    LoginPatterns, RiskLevel, RiskProfile, ThreatAssessment, UserAction,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::constants::ACTIVITY_DECAY;
use crate::logic::config::BehaviorConfig;
use crate::logic::events::generate_id;
use crate::logic::store::{get_json, set_json, KeyValueStore};

const ACTION_PREFIX: &str = "behavior:action";
const BASELINE_PREFIX: &str = "behavior:baseline";
const ASSESSMENT_PREFIX: &str = "behavior:assessment";

// ============================================================================
// SCORING
// ============================================================================

/// Activity weight added to the recent-activity score per action type
pub fn action_weight(action_type: &str) -> f64 {
    match action_type {
        "data_export" | "admin" | "admin_action" => 0.05,
        "payment" => 0.03,
        "login" => 0.02,
        _ => 0.01,
    }
}

/// `clamp(baseline_risk + recent_activity + Σ confidence × weight(severity), 0, 1)`
pub fn compute_risk_score(baseline_risk: f64, recent_activity: f64, anomalies: &[AnomalyRecord]) -> f64 {
    let anomaly_score: f64 = anomalies
        .iter()
        .map(|a| a.confidence * a.severity.risk_weight())
        .sum();
    (baseline_risk + recent_activity + anomaly_score).clamp(0.0, 1.0)
}

/// Fold one action into the baseline
pub fn apply_action(baseline: &mut BehaviorBaseline, action: &UserAction) {
    let pattern = baseline.action_patterns.entry(action.action_type.clone()).or_default();
    pattern.frequency += 1;
    pattern.time_of_day.insert(action.hour());
    if let Some(ref resource) = action.resource_id {
        pattern.typical_resources.insert(resource.clone());
    }
    if let Some(ms) = action.duration_ms {
        pattern.duration_samples += 1;
        pattern.average_duration += (ms as f64 - pattern.average_duration) / pattern.duration_samples as f64;
    }

    if action.is_login() {
        let login = &mut baseline.login_patterns;
        login.typical_times.insert(action.hour());
        if let Some(location) = action.ip_address.as_deref().and_then(location_of) {
            login.typical_locations.insert(location);
        }
        if let Some(ref ua) = action.user_agent {
            login.device_fingerprints.insert(device_fingerprint(ua));
        }
    }

    let risk = &mut baseline.risk_profile;
    risk.recent_activity_score =
        ((risk.recent_activity_score + action_weight(&action.action_type)) * ACTIVITY_DECAY).max(0.0);

    baseline.total_actions += 1;
    baseline.updated_at = Utc::now();
}

// ============================================================================
// ENGINE
// ============================================================================

struct CachedBaseline {
    baseline: BehaviorBaseline,
    expires_at: DateTime<Utc>,
}

pub struct BehavioralAnalytics {
    config: BehaviorConfig,
    store: Arc<dyn KeyValueStore>,
    detectors: RwLock<Vec<Arc<dyn AnomalyDetector>>>,
    cache: RwLock<HashMap<String, CachedBaseline>>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    actions_recorded: AtomicU64,
    anomalies_detected: AtomicU64,
    assessments_generated: AtomicU64,
    failures: AtomicU64,
}

impl BehavioralAnalytics {
    pub fn new(config: BehaviorConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let detectors: Vec<Arc<dyn AnomalyDetector>> = default_detectors(config.min_frequency_history)
            .into_iter()
            .map(Arc::from)
            .collect();
        Self {
            config,
            store,
            detectors: RwLock::new(detectors),
            cache: RwLock::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
            actions_recorded: AtomicU64::new(0),
            anomalies_detected: AtomicU64::new(0),
            assessments_generated: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    pub fn register_detector(&self, detector: Arc<dyn AnomalyDetector>) {
        log::info!("Registered anomaly detector: {}", detector.name());
        self.detectors.write().push(detector);
    }

    pub fn detector_names(&self) -> Vec<String> {
        self.detectors.read().iter().map(|d| d.name().to_string()).collect()
    }

    /// Best-effort entry point: failures are logged, never returned
    pub async fn record_user_action(&self, action: UserAction) -> Option<ThreatAssessment> {
        match self.analyze_action(&action).await {
            Ok(assessment) => assessment,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::error!("Behavior tracking failed for {} ({}): {}", action.user_id, action.action_type, e);
                None
            }
        }
    }

    /// Fallible core of `record_user_action`
    pub async fn analyze_action(&self, action: &UserAction) -> Result<Option<ThreatAssessment>, BehaviorError> {
        if action.user_id.trim().is_empty() {
            return Err(BehaviorError::InvalidAction("empty user id".into()));
        }
        if action.action_type.trim().is_empty() {
            return Err(BehaviorError::InvalidAction("empty action type".into()));
        }

        let lock = self.user_lock(&action.user_id);
        let _guard = lock.lock().await;

        let action_key = format!("{}:{}:{}", ACTION_PREFIX, action.user_id, action.id);
        set_json(self.store.as_ref(), &action_key, action, self.config.action_ttl()).await?;
        self.actions_recorded.fetch_add(1, Ordering::Relaxed);

        let mut baseline = match self.load_baseline(&action.user_id).await? {
            Some(b) => b,
            None => BehaviorBaseline::new(&action.user_id),
        };

        let anomalies = self.run_detectors(action, &baseline);
        apply_action(&mut baseline, action);

        if !anomalies.is_empty() {
            let history = &mut baseline.risk_profile.anomaly_history;
            history.extend(anomalies.iter().cloned());
            let overflow = history.len().saturating_sub(self.config.max_anomaly_history);
            history.drain(..overflow);
            self.anomalies_detected.fetch_add(anomalies.len() as u64, Ordering::Relaxed);
        }

        self.save_baseline(&baseline).await?;

        if anomalies.is_empty() {
            return Ok(None);
        }

        let assessment = self.assess(action, &baseline, anomalies);
        self.handle_assessment(&assessment).await?;
        Ok(Some(assessment))
    }

    fn run_detectors(&self, action: &UserAction, snapshot: &BehaviorBaseline) -> Vec<AnomalyRecord> {
        let detectors: Vec<Arc<dyn AnomalyDetector>> = self.detectors.read().clone();
        detectors
            .iter()
            .flat_map(|d| d.detect(action, snapshot))
            .collect()
    }

    fn assess(&self, action: &UserAction, baseline: &BehaviorBaseline, anomalies: Vec<AnomalyRecord>) -> ThreatAssessment {
        let risk = &baseline.risk_profile;
        let risk_score = compute_risk_score(risk.baseline_risk, risk.recent_activity_score, &anomalies);

        let (risk_level, recommendations): (RiskLevel, &[&str]) = if risk_score > self.config.high_risk_threshold {
            (RiskLevel::High, &[
                "Require immediate re-authentication",
                "Temporarily suspend the account",
                "Notify the security team",
            ])
        } else if risk_score > self.config.anomaly_threshold {
            (RiskLevel::Elevated, &[
                "Increase monitoring for this user",
                "Notify the user of unusual account activity",
            ])
        } else {
            (RiskLevel::Normal, &["Continue routine monitoring"])
        };

        ThreatAssessment {
            id: generate_id("assess"),
            user_id: action.user_id.clone(),
            timestamp: Utc::now(),
            action_id: action.id.clone(),
            risk_score,
            risk_level,
            anomalies,
            recommendations: recommendations.iter().map(|s| s.to_string()).collect(),
            requires_immediate_action: risk_level == RiskLevel::High,
        }
    }

    async fn handle_assessment(&self, assessment: &ThreatAssessment) -> Result<(), BehaviorError> {
        if assessment.risk_score > self.config.anomaly_threshold {
            log::warn!(
                "High-risk behavior for {}: score {:.2} ({} anomalies: {})",
                assessment.user_id,
                assessment.risk_score,
                assessment.anomalies.len(),
                assessment.anomalies.iter().map(|a| a.anomaly_type.as_str()).collect::<Vec<_>>().join(", ")
            );
        } else {
            log::debug!(
                "Behavior anomalies for {} below threshold (score {:.2})",
                assessment.user_id,
                assessment.risk_score
            );
        }

        let key = format!(
            "{}:{}:{:016}:{}",
            ASSESSMENT_PREFIX,
            assessment.user_id,
            assessment.timestamp.timestamp_millis(),
            assessment.id
        );
        set_json(self.store.as_ref(), &key, assessment, self.config.assessment_ttl()).await?;
        self.assessments_generated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.user_locks
            .lock()
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // ========================================================================
    // BASELINE STORAGE
    // ========================================================================

    async fn load_baseline(&self, user_id: &str) -> Result<Option<BehaviorBaseline>, BehaviorError> {
        {
            let cache = self.cache.read();
            if let Some(entry) = cache.get(user_id).filter(|e| e.expires_at > Utc::now()) {
                return Ok(Some(entry.baseline.clone()));
            }
        }

        let key = format!("{}:{}", BASELINE_PREFIX, user_id);
        let stored: Option<BehaviorBaseline> = get_json(self.store.as_ref(), &key).await?;
        match stored {
            Some(ref b) => self.cache_baseline(b),
            None => {
                self.cache.write().remove(user_id);
            }
        }
        Ok(stored)
    }

    async fn save_baseline(&self, baseline: &BehaviorBaseline) -> Result<(), BehaviorError> {
        let key = format!("{}:{}", BASELINE_PREFIX, baseline.user_id);
        set_json(self.store.as_ref(), &key, baseline, self.config.baseline_ttl()).await?;
        self.cache_baseline(baseline);
        Ok(())
    }

    fn cache_baseline(&self, baseline: &BehaviorBaseline) {
        let cap = self.config.max_cached_baselines;
        let Some(expires_at) = chrono::Duration::from_std(self.config.baseline_cache_ttl())
            .ok()
            .filter(|ttl| cap > 0 && *ttl > chrono::Duration::zero())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        else {
            return;
        };

        let mut cache = self.cache.write();
        if !cache.contains_key(&baseline.user_id) && cache.len() >= cap {
            let now = Utc::now();
            cache.retain(|_, e| e.expires_at > now);
            if cache.len() >= cap {
                let soonest = cache
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(user, _)| user.clone());
                if let Some(user) = soonest {
                    cache.remove(&user);
                }
            }
        }
        cache.insert(
            baseline.user_id.clone(),
            CachedBaseline {
                baseline: baseline.clone(),
                expires_at,
            },
        );
    }

    /// Drop expired cache entries and per-user locks nobody holds; returns cache entries evicted
    pub fn evict_stale(&self) -> usize {
        let now = Utc::now();
        let evicted = {
            let mut cache = self.cache.write();
            let before = cache.len();
            cache.retain(|_, e| e.expires_at > now);
            before - cache.len()
        };
        self.user_locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
        if evicted > 0 {
            log::debug!("Evicted {} cached baselines", evicted);
        }
        evicted
    }

    /// Cached or stored baseline; `None` for a user never observed or whose baseline expired
    pub async fn get_user_baseline(&self, user_id: &str) -> Option<BehaviorBaseline> {
        match self.load_baseline(user_id).await {
            Ok(b) => b,
            Err(e) => {
                log::error!("Failed to load baseline for {}: {}", user_id, e);
                None
            }
        }
    }

    /// Forget a user's baseline (cache and store)
    pub async fn reset_user_baseline(&self, user_id: &str) -> Result<bool, BehaviorError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        self.cache.write().remove(user_id);
        let key = format!("{}:{}", BASELINE_PREFIX, user_id);
        Ok(self.store.delete(&key).await?)
    }

    /// Persisted assessments for a user, newest first
    pub async fn get_recent_assessments(&self, user_id: &str, limit: usize) -> Result<Vec<ThreatAssessment>, BehaviorError> {
        let prefix = format!("{}:{}:", ASSESSMENT_PREFIX, user_id);
        let keys = self.store.keys_with_prefix(&prefix).await?;

        let mut assessments = Vec::new();
        for key in keys.iter().rev().take(limit) {
            if let Some(a) = get_json::<ThreatAssessment>(self.store.as_ref(), key).await? {
                assessments.push(a);
            }
        }
        Ok(assessments)
    }

    /// Raw actions still inside the action TTL, oldest first
    pub async fn get_recent_actions(&self, user_id: &str) -> Result<Vec<UserAction>, BehaviorError> {
        let prefix = format!("{}:{}:", ACTION_PREFIX, user_id);
        let mut actions = Vec::new();
        for key in self.store.keys_with_prefix(&prefix).await? {
            if let Some(a) = get_json::<UserAction>(self.store.as_ref(), &key).await? {
                actions.push(a);
            }
        }
        actions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(actions)
    }

    pub fn stats(&self) -> BehaviorStats {
        BehaviorStats {
            cached_baselines: self.cache.read().len(),
            actions_recorded: self.actions_recorded.load(Ordering::Relaxed),
            anomalies_detected: self.anomalies_detected.load(Ordering::Relaxed),
            assessments_generated: self.assessments_generated.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            detectors: self.detector_names(),
        }
    }
}
