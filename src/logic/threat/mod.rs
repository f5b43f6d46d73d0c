//! Threat Detector Module
//!
//! Batch analysis of a user's recent actions against threat intelligence,
//! deployed deception assets and a zero-trust access evaluation, followed by
//! the registered model hooks.
//!
//! ## Structure
//! - `types`: indicators, decoys, trust evaluation
//! - `zero_trust`: trust scoring and access decision
//! - `models`: `ThreatModel` seam and the placeholder models
//!
//! ## Usage
//! ```ignore
//! let detector = ThreatDetector::new(ThreatConfig::default());
//! detector.add_indicator(IndicatorKind::Ip, "203.0.113.7", "known botnet node")?;
//! let events = detector.analyze_user_behavior("alice", &actions).await;
//! ```

pub mod models;
pub mod types;
pub mod zero_trust;

pub use models::{AnomalyModel, ClassificationModel, ThreatModel};
pub use types::{
    AccessDecision, DeceptionAsset, DeceptionAssetType, DeceptionTrigger, IndicatorKind,
    ThreatError, ThreatIndicator, ThreatStats, TrustFactor, ZeroTrustEvaluation,
};
pub use zero_trust::TrustSignals;

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use regex::Regex;

use crate::details;
use crate::logic::behavior::{BehaviorBaseline, UserAction};
use crate::logic::config::ThreatConfig;
use crate::logic::events::{EventOptions, SecurityEvent, SecurityEventType};

const SOURCE: &str = "threat_detector";

/// Decoys deployed at start-up unless disabled
pub const DEFAULT_DECOYS: &[(DeceptionAssetType, &str, &str)] = &[
    (DeceptionAssetType::Endpoint, "Legacy admin console", "/admin/legacy-console"),
    (DeceptionAssetType::File, "Production secrets backup", "/backup/.env.production"),
    (DeceptionAssetType::Credential, "Root API key", "credential:svc-root-api-key"),
    (DeceptionAssetType::Database, "Customer card export", "db:customers_cards_export"),
];

struct CompiledIndicator {
    indicator: ThreatIndicator,
    pattern: Option<Regex>,
}

impl CompiledIndicator {
    fn matches(&self, action: &UserAction) -> bool {
        match self.indicator.kind {
            IndicatorKind::Ip => action.ip_address.as_deref().map(str::trim) == Some(self.indicator.value.as_str()),
            IndicatorKind::UserAgent => action.user_agent.as_deref().map(str::trim) == Some(self.indicator.value.as_str()),
            IndicatorKind::BehaviorPattern => match self.pattern {
                Some(ref re) => {
                    re.is_match(&action.action_type)
                        || action.resource_id.as_deref().is_some_and(|r| re.is_match(r))
                }
                None => false,
            },
        }
    }
}

pub struct ThreatDetector {
    config: ThreatConfig,
    indicators: RwLock<Vec<CompiledIndicator>>,
    assets: RwLock<Vec<DeceptionAsset>>,
    models: RwLock<Vec<Arc<dyn ThreatModel>>>,
}

impl ThreatDetector {
    pub fn new(config: ThreatConfig) -> Self {
        let detector = Self {
            config,
            indicators: RwLock::new(Vec::new()),
            assets: RwLock::new(Vec::new()),
            models: RwLock::new(vec![
                Arc::new(AnomalyModel) as Arc<dyn ThreatModel>,
                Arc::new(ClassificationModel),
            ]),
        };

        if detector.config.deploy_default_decoys {
            for (asset_type, name, location) in DEFAULT_DECOYS {
                detector.deploy_asset(*asset_type, name, location);
            }
        }
        detector
    }

    pub fn config(&self) -> &ThreatConfig {
        &self.config
    }

    // ========================================================================
    // INDICATORS
    // ========================================================================

    pub fn add_indicator(&self, kind: IndicatorKind, value: &str, description: &str) -> Result<String, ThreatError> {
        let indicator = ThreatIndicator::new(kind, value, description);
        if indicator.value.is_empty() {
            return Err(ThreatError::EmptyIndicator);
        }
        let pattern = match kind {
            IndicatorKind::BehaviorPattern => Some(Regex::new(&indicator.value)?),
            _ => None,
        };

        let mut indicators = self.indicators.write();
        if indicators
            .iter()
            .any(|c| c.indicator.kind == kind && c.indicator.value == indicator.value)
        {
            return Err(ThreatError::DuplicateIndicator(format!("{}:{}", kind, indicator.value)));
        }

        let id = indicator.id.clone();
        log::info!("Threat indicator added: {} {} ({})", kind, indicator.value, id);
        indicators.push(CompiledIndicator { indicator, pattern });
        Ok(id)
    }

    pub fn remove_indicator(&self, indicator_id: &str) -> bool {
        let mut indicators = self.indicators.write();
        let before = indicators.len();
        indicators.retain(|c| c.indicator.id != indicator_id);
        before != indicators.len()
    }

    pub fn get_indicators(&self) -> Vec<ThreatIndicator> {
        self.indicators.read().iter().map(|c| c.indicator.clone()).collect()
    }

    /// Indicators matching one action
    pub fn match_indicators(&self, action: &UserAction) -> Vec<ThreatIndicator> {
        self.indicators
            .read()
            .iter()
            .filter(|c| c.matches(action))
            .map(|c| c.indicator.clone())
            .collect()
    }

    // ========================================================================
    // DECEPTION
    // ========================================================================

    pub fn deploy_asset(&self, asset_type: DeceptionAssetType, name: &str, location: &str) -> String {
        let asset = DeceptionAsset::new(asset_type, name, location);
        let id = asset.id.clone();
        log::debug!("Deception asset deployed: {} at {}", name, location);
        self.assets.write().push(asset);
        id
    }

    pub fn remove_asset(&self, asset_id: &str) -> bool {
        let mut assets = self.assets.write();
        let before = assets.len();
        assets.retain(|a| a.id != asset_id);
        before != assets.len()
    }

    pub fn get_assets(&self) -> Vec<DeceptionAsset> {
        self.assets.read().clone()
    }

    pub fn get_asset(&self, asset_id: &str) -> Option<DeceptionAsset> {
        self.assets.read().iter().find(|a| a.id == asset_id).cloned()
    }

    fn decoy_hit(&self, action: &UserAction) -> Option<DeceptionAsset> {
        let resource = action.resource_id.as_deref()?;
        self.assets.read().iter().find(|a| a.location == resource).cloned()
    }

    fn record_trigger(&self, asset_id: &str, action: &UserAction) {
        if let Some(asset) = self.assets.write().iter_mut().find(|a| a.id == asset_id) {
            asset.triggered.push(DeceptionTrigger {
                timestamp: Utc::now(),
                user_id: action.user_id.clone(),
                action_id: action.id.clone(),
                ip_address: action.ip_address.clone(),
            });
        }
    }

    // ========================================================================
    // MODELS
    // ========================================================================

    pub fn register_model(&self, model: Arc<dyn ThreatModel>) {
        log::info!("Threat model registered: {}", model.name());
        self.models.write().push(model);
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.read().iter().map(|m| m.name().to_string()).collect()
    }

    // ========================================================================
    // ANALYSIS
    // ========================================================================

    /// Trust evaluation only; does not record decoy triggers
    pub fn evaluate_zero_trust(&self, user_id: &str, actions: &[UserAction]) -> ZeroTrustEvaluation {
        let signals = TrustSignals {
            intel_matches: actions.iter().map(|a| self.match_indicators(a).len()).sum(),
            deception_hits: actions.iter().filter(|a| self.decoy_hit(a).is_some()).count(),
        };
        zero_trust::evaluate(user_id, actions, signals, &self.config)
    }

    pub async fn analyze_user_behavior(&self, user_id: &str, actions: &[UserAction]) -> Vec<SecurityEvent> {
        self.analyze_with_baseline(user_id, actions, None).await
    }

    pub async fn analyze_with_baseline(
        &self,
        user_id: &str,
        actions: &[UserAction],
        baseline: Option<&BehaviorBaseline>,
    ) -> Vec<SecurityEvent> {
        self.analyze(user_id, actions, actions, baseline).await
    }

    /// Rule checks on `action` only; zero-trust and models see the whole `session`
    pub async fn analyze_action(
        &self,
        action: &UserAction,
        session: &[UserAction],
        baseline: Option<&BehaviorBaseline>,
    ) -> Vec<SecurityEvent> {
        let mut context: Vec<UserAction> = session.iter().filter(|a| a.id != action.id).cloned().collect();
        context.push(action.clone());
        self.analyze(&action.user_id, std::slice::from_ref(action), &context, baseline).await
    }

    /// Rule checks per `checked` action, one zero-trust evaluation over `context`, then model hooks
    async fn analyze(
        &self,
        user_id: &str,
        checked: &[UserAction],
        context: &[UserAction],
        baseline: Option<&BehaviorBaseline>,
    ) -> Vec<SecurityEvent> {
        let mut events = Vec::new();
        let mut signals = TrustSignals::default();

        for action in checked {
            for indicator in self.match_indicators(action) {
                signals.intel_matches += 1;
                events.push(SecurityEvent::new(
                    SecurityEventType::ThreatIntelMatch,
                    details!(
                        "indicatorId" => indicator.id,
                        "indicatorType" => indicator.kind.as_str(),
                        "indicatorValue" => indicator.value,
                        "description" => indicator.description,
                        "actionId" => action.id,
                        "actionType" => action.action_type
                    ),
                    action_options(user_id, action).severity(indicator.severity),
                ));
            }

            if let Some(asset) = self.decoy_hit(action) {
                signals.deception_hits += 1;
                self.record_trigger(&asset.id, action);
                log::warn!(
                    "Deception asset '{}' touched by {} from {}",
                    asset.name,
                    user_id,
                    action.ip_address.as_deref().unwrap_or("unknown")
                );
                events.push(SecurityEvent::new(
                    SecurityEventType::DeceptionAssetTriggered,
                    details!(
                        "assetId" => asset.id,
                        "assetType" => asset.asset_type.as_str(),
                        "assetName" => asset.name,
                        "location" => asset.location,
                        "actionId" => action.id
                    ),
                    action_options(user_id, action),
                ));
            }
        }

        if let Some(last) = context.last() {
            let evaluation = zero_trust::evaluate(user_id, context, signals, &self.config);
            if evaluation.decision == AccessDecision::Deny {
                events.push(SecurityEvent::new(
                    SecurityEventType::ZeroTrustViolation,
                    details!(
                        "trustScore" => evaluation.trust_score,
                        "decision" => evaluation.decision.as_str(),
                        "factors" => evaluation.factors,
                        "actionsEvaluated" => evaluation.actions_evaluated
                    ),
                    action_options(user_id, last),
                ));
            } else {
                log::debug!(
                    "Zero-trust for {}: {} ({:.2})",
                    user_id,
                    evaluation.decision,
                    evaluation.trust_score
                );
            }
        }

        let models: Vec<Arc<dyn ThreatModel>> = self.models.read().clone();
        for model in models {
            events.extend(model.detect(user_id, context, baseline).await);
        }

        events
    }

    pub fn stats(&self) -> ThreatStats {
        let assets = self.assets.read();
        ThreatStats {
            indicators: self.indicators.read().len(),
            deception_assets: assets.len(),
            triggered_assets: assets.iter().filter(|a| !a.triggered.is_empty()).count(),
            total_triggers: assets.iter().map(|a| a.triggered.len()).sum(),
            models: self.model_names(),
        }
    }
}

fn action_options(user_id: &str, action: &UserAction) -> EventOptions {
    let mut options = EventOptions::new().source(SOURCE).user(user_id);
    if let Some(ref ip) = action.ip_address {
        options = options.ip(ip);
    }
    if let Some(ref ua) = action.user_agent {
        options = options.user_agent(ua);
    }
    if let Some(ref session) = action.session_id {
        options = options.correlation(session);
    }
    options
}
