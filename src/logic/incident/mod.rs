//! Incident Response Module
//!
//! Turns escalating security events into tracked incidents, alerts on creation
//! and runs the category playbook's automated steps.
//!
//! # Flow (per event)
//! 1. Categorize (`IncidentCategory::from_event_type`); unmapped events are ignored
//! 2. Escalation check: critical severity, `attempts` over the limit, or an
//!    always-escalate event type. Anything else stays in the monitor log only.
//! 3. Open the incident (`detected`), attach remediation checklist and response team,
//!    alert (never deduplicated: one alert per incident)
//! 4. Run the playbook against a snapshot: automated steps in dependency order,
//!    manual steps handed off
//! 5. Merge the run into the stored record and move to `investigating` unless an
//!    analyst already changed the status

pub mod containment;
pub mod evidence;
pub mod playbook;
pub mod types;
#[cfg(test)]
mod tests;

pub use containment::{ContainmentActions, ContainmentError, RecordingContainment, StakeholderNotice};
pub use playbook::{default_playbooks, AutomatedAction, Playbook, PlaybookStep, StepType};
pub use types::{
    Evidence, EvidenceKind, Incident, IncidentCategory, IncidentError, IncidentStats,
    IncidentStatus, TimelineEntry,
};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use parking_lot::RwLock;

use crate::logic::alerting::SecurityAlerting;
use crate::logic::config::IncidentConfig;
use crate::logic::events::{generate_id, SecurityEvent, SecurityEventType, Severity};
use crate::logic::monitor::SecurityMonitor;
use crate::logic::store::{get_json, set_json, KeyValueStore};

const INCIDENT_PREFIX: &str = "incident:";
const SYSTEM_ACTOR: &str = "system";
const LOG_SNAPSHOT_LIMIT: usize = 100;

/// Event types that open an incident regardless of severity or attempts
const ALWAYS_ESCALATE: &[SecurityEventType] = &[
    SecurityEventType::DeceptionAssetTriggered,
    SecurityEventType::ZeroTrustViolation,
    SecurityEventType::PaymentFraudSuspected,
    SecurityEventType::InputInjectionAttempt,
];

/// Timeline and evidence produced by one playbook run
#[derive(Default)]
struct ResponseOutcome {
    started: bool,
    timeline: Vec<TimelineEntry>,
    evidence: Vec<Evidence>,
}

impl ResponseOutcome {
    fn log(&mut self, action: &str, details: Option<String>) {
        self.timeline.push(TimelineEntry::new(action, SYSTEM_ACTOR, details));
    }

    /// Append to the stored record; status only moves if nobody changed it meanwhile
    fn merge_into(self, incident: &mut Incident) -> Result<(), IncidentError> {
        incident.timeline.extend(self.timeline);
        incident.timeline.sort_by_key(|entry| entry.timestamp);
        incident.evidence.extend(self.evidence);
        incident.updated_at = Utc::now();
        if self.started && incident.status == IncidentStatus::Detected {
            incident.status = IncidentStatus::Investigating;
            incident.log("Status changed to investigating", SYSTEM_ACTOR, None);
        }
        Ok(())
    }
}

pub struct IncidentResponseEngine {
    config: IncidentConfig,
    alerting: Arc<SecurityAlerting>,
    containment: Arc<dyn ContainmentActions>,
    monitor: Option<Arc<SecurityMonitor>>,
    store: Option<Arc<dyn KeyValueStore>>,
    playbooks: RwLock<Vec<Playbook>>,
    incidents: RwLock<HashMap<String, Incident>>,
}

impl IncidentResponseEngine {
    pub fn new(
        config: IncidentConfig,
        alerting: Arc<SecurityAlerting>,
        containment: Arc<dyn ContainmentActions>,
    ) -> Self {
        Self {
            config,
            alerting,
            containment,
            monitor: None,
            store: None,
            playbooks: RwLock::new(default_playbooks()),
            incidents: RwLock::new(HashMap::new()),
        }
    }

    /// Source of log snapshots for evidence collection
    pub fn with_monitor(mut self, monitor: Arc<SecurityMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Mirror incidents to `incident:<id>` (no expiry)
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &IncidentConfig {
        &self.config
    }

    // ========================================================================
    // RULES
    // ========================================================================

    pub fn should_escalate(&self, event: &SecurityEvent) -> bool {
        event.severity == Severity::Critical
            || ALWAYS_ESCALATE.contains(&event.event_type)
            || event
                .detail_u64("attempts")
                .is_some_and(|n| n > self.config.escalation_attempts)
    }

    /// Critical events stay critical; everything else takes the category severity
    pub fn assess_severity(event: &SecurityEvent, category: IncidentCategory) -> Severity {
        if event.severity == Severity::Critical {
            Severity::Critical
        } else {
            category.default_severity()
        }
    }

    pub fn affected_assets(event: &SecurityEvent) -> Vec<String> {
        let mut assets = Vec::new();
        if let Some(ref user) = event.user_id {
            assets.push(format!("user:{}", user));
        }
        if let Some(ref ip) = event.ip_address {
            assets.push(format!("ip:{}", ip));
        }
        for key in ["resourceId", "resource", "location"] {
            if let Some(resource) = event.detail_str(key) {
                assets.push(format!("resource:{}", resource));
                break;
            }
        }
        for key in ["hostname", "host", "system"] {
            if let Some(system) = event.detail_str(key) {
                assets.push(format!("system:{}", system));
                break;
            }
        }
        assets
    }

    // ========================================================================
    // PROCESSING
    // ========================================================================

    /// Incidents opened for this batch, in event order
    pub async fn process_security_events(&self, events: &[SecurityEvent]) -> Vec<Incident> {
        let mut created = Vec::new();
        for event in events {
            if let Some(incident) = self.handle_event(event).await {
                created.push(incident);
            }
        }
        created
    }

    async fn handle_event(&self, event: &SecurityEvent) -> Option<Incident> {
        let category = IncidentCategory::from_event_type(event.event_type)?;
        if !self.should_escalate(event) {
            log::debug!("Event {} ({}) below escalation rules", event.id, event.event_type.as_str());
            return None;
        }

        let incident = self.open_incident(event, category);
        log::warn!(
            "Incident {} opened: {} [{}] from {}",
            incident.id,
            incident.title,
            incident.severity,
            event.event_type.as_str()
        );
        self.save(&incident).await;

        let alert = self
            .alerting
            .send_distinct_alert(
                &incident.title,
                &incident.description,
                incident.severity,
                vec![event.clone()],
                incident.remediation_steps.clone(),
            )
            .await;
        let alerted = self
            .modify(&incident.id, |stored| {
                stored.log("Alert sent", SYSTEM_ACTOR, Some(alert.id.clone()));
                stored.alert_id = Some(alert.id.clone());
                Ok(())
            })
            .await;
        let mut incident = match alerted {
            Ok(updated) => updated,
            Err(e) => {
                log::error!("Incident {} lost before alert was recorded: {}", incident.id, e);
                return Some(incident);
            }
        };

        if self.config.auto_response {
            let response = self.execute_response(&incident).await;
            match self.modify(&incident.id, |stored| response.merge_into(stored)).await {
                Ok(updated) => incident = updated,
                Err(e) => log::error!("Incident {} response not recorded: {}", incident.id, e),
            }
        }

        Some(incident)
    }

    fn open_incident(&self, event: &SecurityEvent, category: IncidentCategory) -> Incident {
        let now = Utc::now();
        let subject = event
            .user_id
            .as_deref()
            .or(event.ip_address.as_deref())
            .unwrap_or("unknown source");

        let mut incident = Incident {
            id: generate_id("inc"),
            title: format!("{}: {}", category.title(), subject),
            description: format!(
                "{} event {} escalated to a {} incident",
                event.event_type.as_str(),
                event.id,
                category
            ),
            category,
            severity: Self::assess_severity(event, category),
            status: IncidentStatus::Detected,
            created_at: now,
            updated_at: now,
            source_events: vec![event.id.clone()],
            affected_assets: Self::affected_assets(event),
            response_team: self
                .get_playbook(category)
                .map(|p| p.response_team())
                .unwrap_or_default(),
            remediation_steps: category.remediation_steps().iter().map(|s| s.to_string()).collect(),
            timeline: Vec::new(),
            evidence: vec![Evidence::new(
                EvidenceKind::SourceEvent,
                "Triggering security event",
                serde_json::to_value(event).unwrap_or_default(),
            )],
            assigned_to: None,
            alert_id: None,
            lessons_learned: None,
            closed_at: None,
        };
        incident.log("Incident registered", SYSTEM_ACTOR, Some(event.id.clone()));
        incident
    }

    // ========================================================================
    // AUTOMATED RESPONSE
    // ========================================================================

    /// Runs the playbook against a snapshot; the caller merges the outcome into
    /// the stored record so concurrent analyst changes survive
    async fn execute_response(&self, incident: &Incident) -> ResponseOutcome {
        let mut outcome = ResponseOutcome::default();
        let Some(playbook) = self.get_playbook(incident.category) else {
            outcome.log("Automated response skipped", Some("no playbook".into()));
            return outcome;
        };
        outcome.started = true;
        outcome.log("Automated response initiated", Some(playbook.name.clone()));

        let mut completed: HashSet<String> = HashSet::new();
        let mut settled: HashSet<String> = HashSet::new();

        loop {
            let ready: Vec<&PlaybookStep> = playbook
                .steps
                .iter()
                .filter(|s| !settled.contains(&s.id))
                .filter(|s| s.dependencies.iter().all(|d| completed.contains(d)))
                .collect();
            if ready.is_empty() {
                break;
            }

            for step in ready {
                settled.insert(step.id.clone());
                let Some(action) = step.step_type.automated_action() else {
                    outcome.log(
                        "Manual step pending",
                        Some(format!("{} ({})", step.name, step.responsible_team)),
                    );
                    continue;
                };
                match self.run_action(action, incident, &mut outcome.evidence).await {
                    Ok(detail) => {
                        completed.insert(step.id.clone());
                        outcome.log(&format!("Step completed: {}", step.name), Some(detail));
                    }
                    Err(e) => {
                        log::error!("Incident {} step '{}' failed: {:#}", incident.id, step.name, e);
                        outcome.log(&format!("Step failed: {}", step.name), Some(format!("{:#}", e)));
                    }
                }
            }
        }

        for step in playbook.steps.iter().filter(|s| !settled.contains(&s.id)) {
            let waiting: Vec<&str> = step
                .dependencies
                .iter()
                .filter(|d| !completed.contains(*d))
                .map(String::as_str)
                .collect();
            outcome.log(
                &format!("Step deferred: {}", step.name),
                Some(format!("waiting on {}", waiting.join(", "))),
            );
        }
        outcome
    }

    async fn run_action(
        &self,
        action: AutomatedAction,
        incident: &Incident,
        artifacts: &mut Vec<Evidence>,
    ) -> anyhow::Result<String> {
        match action {
            AutomatedAction::NetworkContainment => {
                let ips: Vec<&str> = incident.assets_with_prefix("ip:").collect();
                if ips.is_empty() {
                    return Ok("no addresses to block".into());
                }
                for ip in &ips {
                    self.containment
                        .block_ip(ip, &incident.id)
                        .await
                        .with_context(|| format!("blocking {}", ip))?;
                }
                Ok(format!("blocked {}", ips.join(", ")))
            }
            AutomatedAction::SystemIsolation => {
                let systems: Vec<&str> = incident.assets_with_prefix("system:").collect();
                if systems.is_empty() {
                    return Ok("no systems to isolate".into());
                }
                for system in &systems {
                    self.containment
                        .isolate_asset(system, &incident.id)
                        .await
                        .with_context(|| format!("isolating {}", system))?;
                }
                Ok(format!("isolated {}", systems.join(", ")))
            }
            AutomatedAction::EvidenceCollection => {
                let snapshot = tokio::task::spawn_blocking(evidence::system_snapshot)
                    .await
                    .context("system snapshot task")?;
                artifacts.push(Evidence::new(EvidenceKind::SystemSnapshot, "Host snapshot", snapshot));

                let mut collected = 1;
                if let Some(ref monitor) = self.monitor {
                    let user = incident.assets_with_prefix("user:").next();
                    let ip = incident.assets_with_prefix("ip:").next();
                    let related = monitor.related_events(user, ip, LOG_SNAPSHOT_LIMIT);
                    artifacts.push(Evidence::new(
                        EvidenceKind::LogSnapshot,
                        "Related monitor events",
                        evidence::log_snapshot(&related),
                    ));
                    collected += 1;
                }
                Ok(format!("{} evidence items collected", collected))
            }
            AutomatedAction::StakeholderNotification => {
                let subject = format!("[{}] {}", incident.severity, incident.title);
                let body = format!(
                    "Incident {} ({}) is {}.\nAffected: {}\nResponse team: {}\n\nNext steps:\n- {}",
                    incident.id,
                    incident.category,
                    incident.status,
                    incident.affected_assets.join(", "),
                    incident.response_team.iter().map(String::as_str).collect::<Vec<_>>().join(", "),
                    incident.remediation_steps.join("\n- ")
                );
                self.containment
                    .notify_stakeholders(&self.config.stakeholders, &subject, &body)
                    .await
                    .context("stakeholder notification")?;
                Ok(format!("notified {}", self.config.stakeholders.join(", ")))
            }
        }
    }

    // ========================================================================
    // PLAYBOOKS
    // ========================================================================

    pub fn get_playbook(&self, category: IncidentCategory) -> Option<Playbook> {
        self.playbooks.read().iter().find(|p| p.category == category).cloned()
    }

    pub fn get_playbooks(&self) -> Vec<Playbook> {
        self.playbooks.read().clone()
    }

    /// Replaces any playbook for the same category
    pub fn register_playbook(&self, playbook: Playbook) {
        let mut playbooks = self.playbooks.write();
        playbooks.retain(|p| p.category != playbook.category);
        log::info!("Playbook registered: {} ({})", playbook.name, playbook.category);
        playbooks.push(playbook);
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Any status may be assigned directly; the change is recorded in the timeline
    pub async fn update_incident_status(
        &self,
        incident_id: &str,
        status: IncidentStatus,
        actor: &str,
        notes: Option<&str>,
    ) -> Result<Incident, IncidentError> {
        self.modify(incident_id, |incident| {
            let previous = incident.status;
            incident.status = status;
            incident.closed_at = (status == IncidentStatus::Closed).then(Utc::now);
            incident.log(
                &format!("Status changed from {} to {}", previous, status),
                actor,
                notes.map(String::from),
            );
            Ok(())
        })
        .await
    }

    pub async fn assign_incident(&self, incident_id: &str, assignee: &str) -> Result<Incident, IncidentError> {
        self.modify(incident_id, |incident| {
            incident.assigned_to = Some(assignee.to_string());
            incident.log("Incident assigned", SYSTEM_ACTOR, Some(assignee.to_string()));
            Ok(())
        })
        .await
    }

    pub async fn add_timeline_note(&self, incident_id: &str, actor: &str, note: &str) -> Result<Incident, IncidentError> {
        self.modify(incident_id, |incident| {
            incident.log("Note added", actor, Some(note.to_string()));
            Ok(())
        })
        .await
    }

    pub async fn close_incident(&self, incident_id: &str, actor: &str, lessons_learned: &str) -> Result<Incident, IncidentError> {
        self.modify(incident_id, |incident| {
            if incident.status == IncidentStatus::Closed {
                return Err(IncidentError::AlreadyClosed(incident.id.clone()));
            }
            incident.status = IncidentStatus::Closed;
            incident.closed_at = Some(Utc::now());
            incident.lessons_learned = Some(lessons_learned.to_string());
            incident.log("Incident closed", actor, Some(lessons_learned.to_string()));
            Ok(())
        })
        .await
    }

    async fn modify<F>(&self, incident_id: &str, f: F) -> Result<Incident, IncidentError>
    where
        F: FnOnce(&mut Incident) -> Result<(), IncidentError>,
    {
        let updated = {
            let mut incidents = self.incidents.write();
            let incident = incidents
                .get_mut(incident_id)
                .ok_or_else(|| IncidentError::NotFound(incident_id.to_string()))?;
            f(incident)?;
            incident.clone()
        };
        self.save(&updated).await;
        Ok(updated)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn get_incident(&self, incident_id: &str) -> Option<Incident> {
        self.incidents.read().get(incident_id).cloned()
    }

    /// Newest first
    pub fn get_incidents(&self) -> Vec<Incident> {
        let mut list: Vec<Incident> = self.incidents.read().values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub fn get_open_incidents(&self) -> Vec<Incident> {
        self.get_incidents().into_iter().filter(|i| i.status.is_open()).collect()
    }

    pub fn stats(&self) -> IncidentStats {
        let incidents = self.incidents.read();
        let mut stats = IncidentStats {
            total: incidents.len(),
            ..IncidentStats::default()
        };
        for incident in incidents.values() {
            if incident.status.is_open() {
                stats.open += 1;
            }
            *stats.by_status.entry(incident.status).or_default() += 1;
            *stats.by_category.entry(incident.category).or_default() += 1;
            *stats.by_severity.entry(incident.severity).or_default() += 1;
        }
        stats
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    async fn save(&self, incident: &Incident) {
        self.incidents.write().insert(incident.id.clone(), incident.clone());

        if let Some(ref store) = self.store {
            let key = format!("{}{}", INCIDENT_PREFIX, incident.id);
            if let Err(e) = set_json(store.as_ref(), &key, incident, Duration::ZERO).await {
                log::error!("Failed to persist incident {}: {}", incident.id, e);
            }
        }
    }

    /// Reload mirrored incidents, e.g. after a restart
    pub async fn load_from_store(&self) -> Result<usize, IncidentError> {
        let Some(ref store) = self.store else {
            return Ok(0);
        };

        let mut loaded = 0;
        for key in store.keys_with_prefix(INCIDENT_PREFIX).await? {
            if let Some(incident) = get_json::<Incident>(store.as_ref(), &key).await? {
                self.incidents.write().insert(incident.id.clone(), incident);
                loaded += 1;
            }
        }
        log::info!("Loaded {} incidents from store", loaded);
        Ok(loaded)
    }
}
