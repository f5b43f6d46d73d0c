//! Threat Model Hooks
//!
//! Model-driven detection lives behind `ThreatModel`, kept apart from the
//! deterministic intel/deception/zero-trust checks. The built-in models are
//! placeholders that report nothing.

use async_trait::async_trait;

use crate::logic::behavior::{BehaviorBaseline, UserAction};
use crate::logic::events::SecurityEvent;

#[async_trait]
pub trait ThreatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(
        &self,
        user_id: &str,
        actions: &[UserAction],
        baseline: Option<&BehaviorBaseline>,
    ) -> Vec<SecurityEvent>;
}

/// Placeholder for an unsupervised anomaly model
pub struct AnomalyModel;

#[async_trait]
impl ThreatModel for AnomalyModel {
    fn name(&self) -> &str {
        "anomaly"
    }

    async fn detect(
        &self,
        user_id: &str,
        actions: &[UserAction],
        baseline: Option<&BehaviorBaseline>,
    ) -> Vec<SecurityEvent> {
        log::trace!(
            "anomaly model: user={} actions={} baseline={}",
            user_id,
            actions.len(),
            baseline.is_some()
        );
        Vec::new()
    }
}

/// Placeholder for a supervised attack classifier
pub struct ClassificationModel;

#[async_trait]
impl ThreatModel for ClassificationModel {
    fn name(&self) -> &str {
        "classification"
    }

    async fn detect(
        &self,
        user_id: &str,
        actions: &[UserAction],
        _baseline: Option<&BehaviorBaseline>,
    ) -> Vec<SecurityEvent> {
        log::trace!("classification model: user={} actions={}", user_id, actions.len());
        Vec::new()
    }
}
