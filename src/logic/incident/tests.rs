use std::sync::Arc;

use async_trait::async_trait;

use super::*;
use crate::details;
use crate::logic::config::{AlertingConfig, MonitorConfig};
use crate::logic::events::{EventDetails, EventOptions};
use crate::logic::store::{MemoryEventStore, MemoryKeyValueStore};

fn engine_with(config: IncidentConfig) -> (IncidentResponseEngine, Arc<RecordingContainment>, Arc<SecurityAlerting>) {
    let alerting = Arc::new(SecurityAlerting::new(AlertingConfig::default()));
    let containment = Arc::new(RecordingContainment::new());
    let engine = IncidentResponseEngine::new(config, alerting.clone(), containment.clone());
    (engine, containment, alerting)
}

fn engine() -> (IncidentResponseEngine, Arc<RecordingContainment>, Arc<SecurityAlerting>) {
    engine_with(IncidentConfig::default())
}

fn event(event_type: SecurityEventType, details: EventDetails) -> SecurityEvent {
    SecurityEvent::new(event_type, details, EventOptions::new().user("alice").ip("10.0.0.9"))
}

fn actions(incident: &Incident) -> Vec<&str> {
    incident.timeline.iter().map(|t| t.action.as_str()).collect()
}

fn position(incident: &Incident, action: &str) -> Option<usize> {
    incident.timeline.iter().position(|t| t.action == action)
}

struct FirewallDown;

#[async_trait]
impl ContainmentActions for FirewallDown {
    async fn block_ip(&self, _ip: &str, _reason: &str) -> Result<(), ContainmentError> {
        Err(ContainmentError::Unavailable("firewall API timeout".into()))
    }
    async fn isolate_asset(&self, _asset: &str, _reason: &str) -> Result<(), ContainmentError> {
        Ok(())
    }
    async fn notify_stakeholders(&self, _r: &[String], _s: &str, _b: &str) -> Result<(), ContainmentError> {
        Ok(())
    }
}

/// Holds `block_ip` until released so the response can be observed mid-flight
#[derive(Default)]
struct GatedFirewall {
    entered: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

#[async_trait]
impl ContainmentActions for GatedFirewall {
    async fn block_ip(&self, _ip: &str, _reason: &str) -> Result<(), ContainmentError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
    async fn isolate_asset(&self, _asset: &str, _reason: &str) -> Result<(), ContainmentError> {
        Ok(())
    }
    async fn notify_stakeholders(&self, _r: &[String], _s: &str, _b: &str) -> Result<(), ContainmentError> {
        Ok(())
    }
}

// ============================================================================
// ESCALATION
// ============================================================================

#[tokio::test]
async fn test_login_failures_escalate_on_sixth_attempt() {
    let (engine, containment, alerting) = engine();

    for attempt in 1..=5u64 {
        let e = event(SecurityEventType::AuthLoginFailure, details!("attempts" => attempt));
        assert!(engine.process_security_events(&[e]).await.is_empty(), "attempt {attempt}");
    }

    let sixth = event(SecurityEventType::AuthLoginFailure, details!("attempts" => 6));
    let incidents = engine.process_security_events(&[sixth.clone()]).await;
    assert_eq!(incidents.len(), 1);

    let incident = &incidents[0];
    assert_eq!(incident.category, IncidentCategory::UnauthorizedAccess);
    assert!(incident.severity >= Severity::Medium);
    assert_eq!(incident.source_events, vec![sixth.id.clone()]);
    assert_eq!(incident.status, IncidentStatus::Investigating);

    let registered = position(incident, "Incident registered").unwrap();
    let initiated = position(incident, "Automated response initiated").unwrap();
    assert_eq!(registered, 0);
    assert!(initiated > registered);

    assert!(containment.is_blocked("10.0.0.9"));
    assert_eq!(containment.notices().len(), 1);
    assert!(incident.alert_id.is_some());
    assert_eq!(alerting.alert_count(), 1);
    assert!(incident.affected_assets.contains(&"user:alice".to_string()));
}

#[tokio::test]
async fn test_every_incident_is_alerted() {
    let (engine, _, alerting) = engine();
    let mut opened = Vec::new();
    for user in ["user-1001", "user-1002"] {
        let e = SecurityEvent::new(
            SecurityEventType::AuthLoginFailure,
            details!("attempts" => 6),
            EventOptions::new().user(user).ip("10.0.0.9"),
        );
        opened.extend(engine.process_security_events(&[e]).await);
    }

    assert_eq!(opened.len(), 2);
    assert!(opened.iter().all(|i| i.alert_id.is_some()));
    assert_ne!(opened[0].alert_id, opened[1].alert_id);
    assert_eq!(alerting.alert_count(), 2);

    // plain alerts with the same titles are still deduplicated
    let title = &opened[1].title;
    assert!(alerting.send_alert(title, "again", opened[1].severity, vec![], vec![]).await.is_none());
}

#[tokio::test]
async fn test_response_team_from_playbook() {
    let (engine, containment, _) = engine();
    let e = event(SecurityEventType::DataExport, details!("attempts" => 12, "hostname" => "warehouse"));
    let incident = engine.process_security_events(&[e]).await.remove(0);

    assert_eq!(incident.category, IncidentCategory::DataBreach);
    let expected = engine.get_playbook(IncidentCategory::DataBreach).unwrap().response_team();
    assert_eq!(incident.response_team, expected);
    assert!(incident.response_team.contains("legal"));
    assert_eq!(containment.isolated_assets(), vec!["warehouse".to_string()]);

    let notice = &containment.notices()[0];
    assert!(notice.body.contains("legal"));
}

#[tokio::test]
async fn test_rules_and_tables() {
    let (engine, _, _) = engine();

    let routine = event(SecurityEventType::DataExport, details!());
    assert!(!engine.should_escalate(&routine));
    let unmapped = SecurityEvent::new(
        SecurityEventType::SystemError,
        details!(),
        EventOptions::new().severity(Severity::Critical),
    );
    assert!(engine.should_escalate(&unmapped));
    assert!(engine.process_security_events(&[routine, unmapped]).await.is_empty());

    let decoy = event(SecurityEventType::DeceptionAssetTriggered, details!("location" => "/backup/.env"));
    assert!(engine.should_escalate(&decoy));
    let incident = engine.process_security_events(&[decoy]).await.remove(0);
    assert_eq!(incident.category, IncidentCategory::InsiderThreat);
    assert_eq!(incident.severity, Severity::High);
    assert!(incident.affected_assets.contains(&"resource:/backup/.env".to_string()));
    assert!(!incident.remediation_steps.is_empty());
}

#[tokio::test]
async fn test_critical_event_keeps_critical_severity() {
    let (engine, containment, _) = engine();
    let e = SecurityEvent::new(
        SecurityEventType::AuthzAccessDenied,
        details!("hostname" => "db-primary"),
        EventOptions::new().severity(Severity::Critical).ip("192.0.2.44"),
    );
    let incident = engine.process_security_events(&[e]).await.remove(0);
    assert_eq!(incident.category, IncidentCategory::UnauthorizedAccess);
    assert_eq!(incident.severity, Severity::Critical);
    assert!(incident.affected_assets.contains(&"system:db-primary".to_string()));
    assert!(incident.title.contains("192.0.2.44"));
    assert!(containment.is_blocked("192.0.2.44"));
}

// ============================================================================
// PLAYBOOK EXECUTION
// ============================================================================

#[tokio::test]
async fn test_manual_steps_handed_off_and_dependents_deferred() {
    let (engine, _, _) = engine();
    let e = event(SecurityEventType::AuthLoginFailure, details!("attempts" => 9));
    let incident = engine.process_security_events(&[e]).await.remove(0);

    let timeline = actions(&incident);
    assert!(timeline.contains(&"Step completed: Collect authentication evidence"));
    assert!(timeline.contains(&"Step completed: Block offending addresses"));
    assert!(timeline.contains(&"Step completed: Notify security team"));
    assert!(timeline.contains(&"Manual step pending"));
    assert!(timeline.contains(&"Step deferred: Review successful logins"));
    assert_eq!(timeline.last(), Some(&"Status changed to investigating"));

    assert!(incident.evidence.iter().any(|e| e.kind == EvidenceKind::SystemSnapshot));
    assert!(incident.evidence.iter().all(Evidence::verify));
}

#[tokio::test]
async fn test_failed_step_does_not_abort_response() {
    let alerting = Arc::new(SecurityAlerting::new(AlertingConfig::default()));
    let engine = IncidentResponseEngine::new(IncidentConfig::default(), alerting, Arc::new(FirewallDown));

    let e = event(SecurityEventType::PaymentFraudSuspected, details!("amount" => 9_999));
    let incidents = engine.process_security_events(&[e]).await;
    assert_eq!(incidents.len(), 1);

    let incident = &incidents[0];
    let timeline = actions(incident);
    assert!(timeline.contains(&"Step failed: Block fraudulent sources"));
    assert!(timeline.contains(&"Step completed: Notify finance and security"));
    assert!(timeline.contains(&"Step deferred: Freeze affected payment methods"));
    assert_eq!(incident.status, IncidentStatus::Investigating);
    assert!(engine.get_incident(&incident.id).is_some());
}

#[tokio::test]
async fn test_auto_response_disabled() {
    let config = IncidentConfig {
        auto_response: false,
        ..IncidentConfig::default()
    };
    let (engine, containment, _) = engine_with(config);
    let e = event(SecurityEventType::ZeroTrustViolation, details!());
    let incident = engine.process_security_events(&[e]).await.remove(0);

    assert_eq!(incident.status, IncidentStatus::Detected);
    assert!(position(&incident, "Automated response initiated").is_none());
    assert!(containment.blocked_ips().is_empty());
}

#[tokio::test]
async fn test_log_snapshot_from_monitor() {
    let monitor = Arc::new(SecurityMonitor::new(MonitorConfig::default(), Arc::new(MemoryEventStore::default())));
    for attempt in 1..=3 {
        monitor.log_auth_event(
            SecurityEventType::AuthLoginFailure,
            details!("attempts" => attempt),
            EventOptions::new().user("alice"),
        );
    }

    let (engine, _, _) = engine();
    let engine = engine.with_monitor(monitor);
    let e = event(SecurityEventType::InputInjectionAttempt, details!("field" => "q"));
    let incident = engine.process_security_events(&[e]).await.remove(0);

    let snapshot = incident
        .evidence
        .iter()
        .find(|e| e.kind == EvidenceKind::LogSnapshot)
        .unwrap();
    assert_eq!(snapshot.payload["count"], 3);
    assert!(snapshot.verify());
}

#[tokio::test]
async fn test_custom_playbook_replaces_default() {
    let (engine, containment, _) = engine();
    engine.register_playbook(Playbook {
        id: "pb-dos-custom".into(),
        name: "Custom DoS".into(),
        category: IncidentCategory::DenialOfService,
        steps: vec![
            PlaybookStep {
                id: "wait".into(),
                name: "Wait for upstream".into(),
                description: "Block once the upstream provider confirms".into(),
                step_type: StepType::Automated(AutomatedAction::NetworkContainment),
                responsible_team: "network".into(),
                dependencies: vec!["missing".into()],
            },
        ],
        escalation_path: vec!["network".into()],
        required_resources: Vec::new(),
    });
    assert_eq!(engine.get_playbooks().len(), IncidentCategory::ALL.len());

    let e = event(SecurityEventType::RateLimitIpBlocked, details!("attempts" => 500));
    let incident = engine.process_security_events(&[e]).await.remove(0);
    assert!(actions(&incident).contains(&"Step deferred: Wait for upstream"));
    assert!(containment.blocked_ips().is_empty());
    assert_eq!(incident.response_team.iter().collect::<Vec<_>>(), vec!["network"]);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_status_override_and_close() {
    let (engine, _, _) = engine();
    let e = event(SecurityEventType::AuthSessionHijack, details!("attempts" => 7));
    let id = engine.process_security_events(&[e]).await.remove(0).id;

    let recovered = engine
        .update_incident_status(&id, IncidentStatus::Recovered, "analyst", Some("false positive path"))
        .await
        .unwrap();
    assert_eq!(recovered.status, IncidentStatus::Recovered);
    let last = recovered.timeline.last().unwrap();
    assert_eq!(last.action, "Status changed from investigating to recovered");
    assert_eq!(last.actor, "analyst");

    let assigned = engine.assign_incident(&id, "oncall@corp").await.unwrap();
    assert_eq!(assigned.assigned_to.as_deref(), Some("oncall@corp"));
    engine.add_timeline_note(&id, "analyst", "user confirmed travel").await.unwrap();

    let closed = engine.close_incident(&id, "analyst", "tune geo rules").await.unwrap();
    assert_eq!(closed.status, IncidentStatus::Closed);
    assert!(closed.closed_at.is_some());
    assert_eq!(closed.lessons_learned.as_deref(), Some("tune geo rules"));

    assert!(matches!(
        engine.close_incident(&id, "analyst", "again").await,
        Err(IncidentError::AlreadyClosed(_))
    ));
    assert!(matches!(
        engine.update_incident_status("inc_missing", IncidentStatus::Closed, "analyst", None).await,
        Err(IncidentError::NotFound(_))
    ));
    assert!(engine.get_open_incidents().is_empty());
    assert_eq!(engine.stats().by_status.get(&IncidentStatus::Closed), Some(&1));
}

#[tokio::test]
async fn test_analyst_changes_during_response_are_kept() {
    let alerting = Arc::new(SecurityAlerting::new(AlertingConfig::default()));
    let firewall = Arc::new(GatedFirewall::default());
    let engine = Arc::new(IncidentResponseEngine::new(
        IncidentConfig::default(),
        alerting,
        firewall.clone(),
    ));

    let running = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let e = event(SecurityEventType::AuthLoginFailure, details!("attempts" => 8));
            engine.process_security_events(&[e]).await.remove(0)
        })
    };

    firewall.entered.notified().await;
    let id = engine.get_incidents()[0].id.clone();
    engine.assign_incident(&id, "oncall@corp").await.unwrap();
    engine
        .update_incident_status(&id, IncidentStatus::Contained, "analyst", Some("edge blocked manually"))
        .await
        .unwrap();
    firewall.release.notify_one();

    let returned = running.await.unwrap();
    let stored = engine.get_incident(&id).unwrap();
    assert_eq!(returned, stored);

    assert_eq!(stored.assigned_to.as_deref(), Some("oncall@corp"));
    assert_eq!(stored.status, IncidentStatus::Contained);
    let timeline = actions(&stored);
    assert!(timeline.contains(&"Incident assigned"));
    assert!(timeline.contains(&"Step completed: Block offending addresses"));
    assert!(!timeline.contains(&"Status changed to investigating"));
    assert!(stored.timeline.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn test_incidents_newest_first() {
    let (engine, _, _) = engine();
    let first = engine
        .process_security_events(&[event(SecurityEventType::ZeroTrustViolation, details!())])
        .await
        .remove(0);
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = engine
        .process_security_events(&[event(SecurityEventType::InputInjectionAttempt, details!())])
        .await
        .remove(0);

    let ids: Vec<String> = engine.get_incidents().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let stats = engine.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.open, 2);
}

#[tokio::test]
async fn test_incidents_mirrored_and_reloaded() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let (first, _, _) = engine();
    let mirrored = first.with_store(store.clone());

    let incident = mirrored
        .process_security_events(&[event(SecurityEventType::ZeroTrustViolation, details!())])
        .await
        .remove(0);
    mirrored.add_timeline_note(&incident.id, "analyst", "checked").await.unwrap();

    let (fresh, _, _) = engine();
    let fresh = fresh.with_store(store);
    assert_eq!(fresh.load_from_store().await.unwrap(), 1);
    let reloaded = fresh.get_incident(&incident.id).unwrap();
    assert_eq!(reloaded.timeline.last().unwrap().action, "Note added");
}

#[test]
fn test_evidence_digest_detects_tampering() {
    let mut evidence = Evidence::new(EvidenceKind::SourceEvent, "test", serde_json::json!({"a": 1}));
    assert_eq!(evidence.sha256.len(), 64);
    assert!(evidence.verify());
    evidence.payload = serde_json::json!({"a": 2});
    assert!(!evidence.verify());
}

#[test]
fn test_category_table() {
    assert_eq!(
        IncidentCategory::from_event_type(SecurityEventType::AuthLoginFailure),
        Some(IncidentCategory::UnauthorizedAccess)
    );
    assert_eq!(
        IncidentCategory::from_event_type(SecurityEventType::PaymentWebhookReplay),
        Some(IncidentCategory::PaymentFraud)
    );
    assert_eq!(IncidentCategory::from_event_type(SecurityEventType::AuthLoginSuccess), None);
    assert_eq!(IncidentCategory::DataBreach.default_severity(), Severity::Critical);
}
