//! Security Pipeline
//!
//! Composition of the five engines. Built once at the process root and shared
//! by `Arc`; every engine is also reachable on its own.
//!
//! ## Flows
//! - `ingest_event`: monitor log → immediate alert → incident processing
//! - `process_user_action`: behavioral analysis → behavior event → threat detector
//!   → resulting events logged, alerted if immediate, fed to incident response

pub mod types;

pub use types::{
    ControlCheck, IngestOutcome, PipelineOutcome, RestoreReport, SecurityPosture, StatusReport,
};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::constants::APP_VERSION;
use crate::details;
use crate::logic::alerting::SecurityAlerting;
use crate::logic::behavior::{BehavioralAnalytics, ThreatAssessment, UserAction};
use crate::logic::config::SecurityConfig;
use crate::logic::events::{EventDetails, EventOptions, SecurityAlert, SecurityEvent, SecurityEventType, Severity};
use crate::logic::incident::{
    ContainmentActions, IncidentCategory, IncidentResponseEngine, RecordingContainment,
};
use crate::logic::monitor::SecurityMonitor;
use crate::logic::store::{EventStore, KeyValueStore};
use crate::logic::threat::ThreatDetector;

/// Recent actions fed to the zero-trust evaluation
const SESSION_WINDOW: Duration = Duration::from_secs(3600);
const SESSION_MAX_ACTIONS: usize = 50;
const REPORT_WINDOW: Duration = Duration::from_secs(24 * 3600);

pub struct SecurityPipeline {
    monitor: Arc<SecurityMonitor>,
    alerting: Arc<SecurityAlerting>,
    behavior: Arc<BehavioralAnalytics>,
    threat: Arc<ThreatDetector>,
    incidents: Arc<IncidentResponseEngine>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl SecurityPipeline {
    pub fn new(
        monitor: Arc<SecurityMonitor>,
        alerting: Arc<SecurityAlerting>,
        behavior: Arc<BehavioralAnalytics>,
        threat: Arc<ThreatDetector>,
        incidents: Arc<IncidentResponseEngine>,
    ) -> Self {
        Self {
            monitor,
            alerting,
            behavior,
            threat,
            incidents,
            store: None,
        }
    }

    /// Wire every engine from one config and a pair of stores
    pub fn from_config(
        config: &SecurityConfig,
        events: Arc<dyn EventStore>,
        kv: Arc<dyn KeyValueStore>,
        containment: Arc<dyn ContainmentActions>,
    ) -> Self {
        let monitor = Arc::new(SecurityMonitor::new(config.monitor.clone(), events));
        let alerting = Arc::new(SecurityAlerting::new(config.alerting.clone()).with_store(kv.clone()));
        let behavior = Arc::new(BehavioralAnalytics::new(config.behavior.clone(), kv.clone()));
        let threat = Arc::new(ThreatDetector::new(config.threat.clone()));
        let incidents = Arc::new(
            IncidentResponseEngine::new(config.incident.clone(), alerting.clone(), containment)
                .with_monitor(monitor.clone())
                .with_store(kv.clone()),
        );

        let mut pipeline = Self::new(monitor, alerting, behavior, threat, incidents);
        pipeline.store = Some(kv);
        pipeline
    }

    /// In-memory stores and recording containment
    pub fn in_memory(config: &SecurityConfig) -> Self {
        Self::from_config(
            config,
            Arc::new(crate::logic::store::MemoryEventStore::new(config.monitor.max_event_buffer)),
            Arc::new(crate::logic::store::MemoryKeyValueStore::new()),
            Arc::new(RecordingContainment::new()),
        )
    }

    pub fn monitor(&self) -> &Arc<SecurityMonitor> {
        &self.monitor
    }

    pub fn alerting(&self) -> &Arc<SecurityAlerting> {
        &self.alerting
    }

    pub fn behavior(&self) -> &Arc<BehavioralAnalytics> {
        &self.behavior
    }

    pub fn threat(&self) -> &Arc<ThreatDetector> {
        &self.threat
    }

    pub fn incidents(&self) -> &Arc<IncidentResponseEngine> {
        &self.incidents
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub async fn ingest_event(
        &self,
        event_type: SecurityEventType,
        details: EventDetails,
        options: EventOptions,
    ) -> IngestOutcome {
        let event = self.monitor.log_event(event_type, details, options);
        self.dispatch(event).await
    }

    /// Same as `ingest_event` for an event built elsewhere
    pub async fn ingest(&self, event: SecurityEvent) -> IngestOutcome {
        self.monitor.record_event(event.clone());
        self.dispatch(event).await
    }

    async fn dispatch(&self, event: SecurityEvent) -> IngestOutcome {
        let immediate_alert = self.forward_immediate_alert(&event).await;
        let incidents = self.incidents.process_security_events(std::slice::from_ref(&event)).await;
        IngestOutcome {
            event,
            immediate_alert,
            incidents,
        }
    }

    async fn forward_immediate_alert(&self, event: &SecurityEvent) -> Option<SecurityAlert> {
        let reason = self.monitor.check_immediate_alert(event)?;
        self.alerting
            .send_alert(
                &reason.title(event),
                &reason.description(event),
                event.severity,
                vec![event.clone()],
                reason.recommended_actions(),
            )
            .await
    }

    // ========================================================================
    // USER ACTIONS
    // ========================================================================

    pub async fn process_user_action(&self, action: UserAction) -> PipelineOutcome {
        let assessment = self.behavior.record_user_action(action.clone()).await;

        let mut events = Vec::new();
        if let Some(ref a) = assessment {
            events.push(behavior_event(&action, a));
        }

        let session = self.session_actions(&action).await;
        let baseline = self.behavior.get_user_baseline(&action.user_id).await;
        events.extend(self.threat.analyze_action(&action, &session, baseline.as_ref()).await);

        let mut alerts = Vec::new();
        for event in &events {
            self.monitor.record_event(event.clone());
            if let Some(alert) = self.forward_immediate_alert(event).await {
                alerts.push(alert);
            }
        }
        let incidents = self.incidents.process_security_events(&events).await;

        PipelineOutcome {
            assessment,
            events,
            alerts,
            incidents,
        }
    }

    async fn session_actions(&self, action: &UserAction) -> Vec<UserAction> {
        let mut actions = match self.behavior.get_recent_actions(&action.user_id).await {
            Ok(actions) => actions,
            Err(e) => {
                log::warn!("Recent actions unavailable for {}: {}", action.user_id, e);
                return vec![action.clone()];
            }
        };

        if let Some(cutoff) = chrono::Duration::from_std(SESSION_WINDOW)
            .ok()
            .and_then(|w| action.timestamp.checked_sub_signed(w))
        {
            actions.retain(|a| a.timestamp >= cutoff);
        }
        let skip = actions.len().saturating_sub(SESSION_MAX_ACTIONS);
        actions.drain(..skip);
        actions
    }

    // ========================================================================
    // REPORTING
    // ========================================================================

    pub async fn status_report(&self) -> StatusReport {
        let monitor = self.monitor.status();
        let behavior = self.behavior.stats();
        let threat = self.threat.stats();
        let incidents = self.incidents.stats();

        let enabled_channels = self.alerting.get_channels().iter().filter(|c| c.enabled).count();
        let covered = IncidentCategory::ALL
            .iter()
            .filter(|c| self.incidents.get_playbook(**c).is_some())
            .count();

        let controls = vec![
            ControlCheck::new(
                "event_logging",
                monitor.running,
                format!("{} events buffered, {} pending flush", monitor.buffered_events, monitor.pending_flush),
            ),
            ControlCheck::new(
                "alert_channels",
                enabled_channels > 0,
                format!("{} enabled channels", enabled_channels),
            ),
            ControlCheck::new(
                "playbook_coverage",
                covered == IncidentCategory::ALL.len(),
                format!("{}/{} categories covered", covered, IncidentCategory::ALL.len()),
            ),
            ControlCheck::new(
                "behavioral_monitoring",
                !behavior.detectors.is_empty() && behavior.failures == 0,
                format!("{} detectors, {} tracking failures", behavior.detectors.len(), behavior.failures),
            ),
            ControlCheck::new(
                "threat_intel",
                threat.indicators > 0 || threat.deception_assets > 0,
                format!("{} indicators, {} deception assets", threat.indicators, threat.deception_assets),
            ),
        ];

        let open_critical = self
            .incidents
            .get_open_incidents()
            .iter()
            .any(|i| i.severity == Severity::Critical);
        let posture = posture_for(&controls, open_critical);

        StatusReport {
            generated_at: Utc::now(),
            version: APP_VERSION.to_string(),
            monitor,
            events_24h: self.monitor.get_statistics(REPORT_WINDOW),
            alerts_24h: self.alerting.get_alert_stats(REPORT_WINDOW),
            behavior,
            threat,
            incidents,
            controls,
            posture,
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Reload persisted state after a restart; failures are logged and leave that part empty
    pub async fn restore(&self) -> RestoreReport {
        let events = self.monitor.restore_from_store().await.unwrap_or_else(|e| {
            log::warn!("Event restore failed: {}", e);
            0
        });
        let incidents = self.incidents.load_from_store().await.unwrap_or_else(|e| {
            log::warn!("Incident restore failed: {}", e);
            0
        });
        RestoreReport { events, incidents }
    }

    pub fn start(&self) {
        self.monitor.start();
        log::info!("Security pipeline started (v{})", APP_VERSION);
    }

    /// Retention sweep across all engines
    pub async fn run_maintenance(&self) -> usize {
        let mut removed = self.monitor.cleanup_old_events().await;
        removed += self.alerting.cleanup_expired_alerts();
        removed += self.behavior.evict_stale();
        if let Some(ref store) = self.store {
            match store.purge_expired().await {
                Ok(n) => removed += n,
                Err(e) => log::error!("Keyed store purge failed: {}", e),
            }
        }
        log::debug!("Maintenance removed {} records", removed);
        removed
    }

    pub async fn shutdown(&self) {
        self.monitor.shutdown().await;
        log::info!("Security pipeline stopped");
    }
}

fn posture_for(controls: &[ControlCheck], open_critical: bool) -> SecurityPosture {
    let passed = controls.iter().filter(|c| c.passed).count();
    if passed == controls.len() && !open_critical {
        SecurityPosture::Strong
    } else if passed * 2 > controls.len() {
        SecurityPosture::Adequate
    } else {
        SecurityPosture::Weak
    }
}

fn behavior_event(action: &UserAction, assessment: &ThreatAssessment) -> SecurityEvent {
    let severity = if assessment.requires_immediate_action {
        Severity::Critical
    } else {
        assessment.max_severity().max(Severity::Medium)
    };

    let mut options = EventOptions::new()
        .severity(severity)
        .source("behavioral_analytics")
        .user(&action.user_id);
    if let Some(ref ip) = action.ip_address {
        options = options.ip(ip);
    }
    if let Some(ref ua) = action.user_agent {
        options = options.user_agent(ua);
    }

    let anomalies: Vec<&str> = assessment.anomalies.iter().map(|a| a.anomaly_type.as_str()).collect();
    SecurityEvent::new(
        SecurityEventType::BehaviorAnomaly,
        details!(
            "assessmentId" => assessment.id,
            "actionId" => action.id,
            "actionType" => action.action_type,
            "riskScore" => assessment.risk_score,
            "riskLevel" => assessment.risk_level.as_str(),
            "anomalies" => anomalies,
            "recommendations" => assessment.recommendations
        ),
        options,
    )
}
