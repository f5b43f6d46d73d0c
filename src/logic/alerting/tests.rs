use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::senders::{format_email_html, format_pagerduty, format_slack, format_webhook};
use super::*;
use crate::logic::events::{ChannelConfig, ChannelType, EventOptions, SecurityEventType};
use crate::logic::store::{get_json, MemoryKeyValueStore};

// ============================================================================
// FAKES
// ============================================================================

#[derive(Default)]
struct RecordingSender {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    fn channels_for(&self, alert_id: &str) -> Vec<String> {
        self.calls.lock()
            .iter()
            .filter(|(_, a)| a == alert_id)
            .map(|(c, _)| c.clone())
            .collect()
    }

    fn count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AlertSender for RecordingSender {
    async fn send(&self, channel: &AlertChannel, alert: &SecurityAlert) -> Result<(), AlertError> {
        self.calls.lock().push((channel.id.clone(), alert.id.clone()));
        Ok(())
    }
}

struct FailingSender;

#[async_trait]
impl AlertSender for FailingSender {
    async fn send(&self, _channel: &AlertChannel, _alert: &SecurityAlert) -> Result<(), AlertError> {
        Err(AlertError::Network("connection refused".into()))
    }
}

struct SlowSender;

#[async_trait]
impl AlertSender for SlowSender {
    async fn send(&self, _channel: &AlertChannel, _alert: &SecurityAlert) -> Result<(), AlertError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[derive(Default)]
struct FakeMail {
    sent: Mutex<Vec<(SmtpTarget, MailMessage)>>,
}

#[async_trait]
impl MailTransport for FakeMail {
    async fn send_mail(&self, target: &SmtpTarget, message: &MailMessage) -> Result<(), AlertError> {
        self.sent.lock().push((target.clone(), message.clone()));
        Ok(())
    }
}

fn email_config() -> ChannelConfig {
    ChannelConfig::Email {
        smtp_host: "smtp.local".into(),
        smtp_port: 25,
        username: None,
        password: None,
        from: "secmon@local".into(),
        recipients: vec!["soc@local".into()],
    }
}

fn webhook_config() -> ChannelConfig {
    ChannelConfig::Webhook {
        url: "http://127.0.0.1:9/hook".into(),
        method: "POST".into(),
        headers: Default::default(),
    }
}

fn recording_registry(sender: Arc<RecordingSender>) -> SenderRegistry {
    let mut registry = SenderRegistry::new();
    for t in [ChannelType::Email, ChannelType::Slack, ChannelType::PagerDuty, ChannelType::Webhook] {
        registry.register(t, sender.clone());
    }
    registry
}

fn sample_alert() -> SecurityAlert {
    let event = SecurityEvent::new(
        SecurityEventType::AuthLoginFailure,
        crate::details!("attempts" => 6),
        EventOptions::new().user("<script>"),
    );
    SecurityAlert::new(
        "Brute force <detected>",
        "6 failures & counting",
        Severity::High,
        vec![event],
        vec!["Lock the account".into()],
    )
}

// ============================================================================
// ROUTING
// ============================================================================

#[tokio::test]
async fn test_threshold_routing_is_total_order() {
    let sender = Arc::new(RecordingSender::default());
    let alerting = SecurityAlerting::with_senders(AlertingConfig::default(), recording_registry(sender.clone()));

    let mut by_threshold = Vec::new();
    for t in Severity::ALL {
        let id = alerting.add_channel(AlertChannel::new(t.as_str(), t, webhook_config()));
        by_threshold.push((t, id));
    }

    for s in Severity::ALL {
        let alert = alerting
            .send_alert(&format!("Alert at {}", s), "routing", s, vec![], vec![])
            .await
            .unwrap();
        let received = sender.channels_for(&alert.id);
        for (t, id) in &by_threshold {
            assert_eq!(received.contains(id), s.rank() >= t.rank(), "severity {} threshold {}", s, t);
        }
    }
}

#[tokio::test]
async fn test_disabled_channel_skipped() {
    let sender = Arc::new(RecordingSender::default());
    let alerting = SecurityAlerting::with_senders(AlertingConfig::default(), recording_registry(sender.clone()));
    let id = alerting.add_channel(AlertChannel::new("hook", Severity::Low, webhook_config()));
    assert!(alerting.update_channel(&id, ChannelUpdate { enabled: Some(false), ..Default::default() }));

    let alert = alerting.send_alert("Quiet", "nobody listens", Severity::Critical, vec![], vec![]).await;
    assert!(alert.is_some());
    assert_eq!(sender.count(), 0);
    assert_eq!(alerting.alert_count(), 1);
}

// ============================================================================
// DEDUP
// ============================================================================

#[tokio::test]
async fn test_dedup_window() {
    let config = AlertingConfig { dedup_window_secs: 1, ..Default::default() };
    let alerting = SecurityAlerting::with_senders(config, SenderRegistry::new());

    assert!(alerting.send_alert("Brute force on user 1", "a", Severity::High, vec![], vec![]).await.is_some());
    assert!(alerting.send_alert("Brute force on user 2", "b", Severity::High, vec![], vec![]).await.is_none());
    assert_eq!(alerting.alert_count(), 1);

    // same title, different severity is not a duplicate
    assert!(alerting.send_alert("Brute force on user 1", "c", Severity::Critical, vec![], vec![]).await.is_some());
    assert_eq!(alerting.alert_count(), 2);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(alerting.send_alert("Brute force on user 1", "d", Severity::High, vec![], vec![]).await.is_some());
    assert_eq!(alerting.alert_count(), 3);
}

#[tokio::test]
async fn test_history_cap() {
    let config = AlertingConfig { max_alert_history: 3, ..Default::default() };
    let alerting = SecurityAlerting::with_senders(config, SenderRegistry::new());
    let titles = ["disk", "payment webhook replay", "privilege escalation", "zero trust"];
    for t in titles {
        alerting.send_alert(t, "x", Severity::Low, vec![], vec![]).await;
    }
    let alerts = alerting.get_alerts(10);
    assert_eq!(alerts.len(), 3);
    assert_eq!(alerts[0].title, "zero trust");
    assert_eq!(alerts[2].title, "payment webhook replay");
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_lifecycle_transitions() {
    let alerting = SecurityAlerting::with_senders(AlertingConfig::default(), SenderRegistry::new());
    let a = alerting.send_alert("First", "x", Severity::Medium, vec![], vec![]).await.unwrap();
    let b = alerting.send_alert("Second thing", "x", Severity::Low, vec![], vec![]).await.unwrap();
    let c = alerting.send_alert("Third unrelated", "x", Severity::High, vec![], vec![]).await.unwrap();

    assert!(alerting.acknowledge_alert(&a.id, "analyst").await);
    assert!(!alerting.acknowledge_alert(&a.id, "analyst").await);
    assert!(alerting.resolve_alert(&a.id, Some("false positive")).await);
    assert!(!alerting.resolve_alert(&a.id, None).await);

    let a = alerting.get_alert(&a.id).unwrap();
    assert_eq!(a.status, AlertStatus::Resolved);
    assert_eq!(a.acknowledged_by.as_deref(), Some("analyst"));
    assert_eq!(a.resolution_notes.as_deref(), Some("false positive"));

    assert!(alerting.resolve_alert(&b.id, None).await);
    assert!(!alerting.acknowledge_alert(&b.id, "late").await);
    assert!(!alerting.dismiss_alert(&b.id).await);

    assert!(alerting.dismiss_alert(&c.id).await);
    assert!(!alerting.resolve_alert(&c.id, None).await);

    assert!(!alerting.acknowledge_alert("alert_missing", "x").await);
    assert!(alerting.get_active_alerts().is_empty());
}

#[tokio::test]
async fn test_alert_stats() {
    let alerting = SecurityAlerting::with_senders(AlertingConfig::default(), SenderRegistry::new());
    let a = alerting.send_alert("Alpha", "x", Severity::High, vec![], vec![]).await.unwrap();
    alerting.send_alert("Completely different", "x", Severity::Low, vec![], vec![]).await;

    alerting.history.write().iter_mut().for_each(|al| {
        if al.id == a.id {
            al.timestamp = al.timestamp - chrono::Duration::seconds(30);
        }
    });
    alerting.acknowledge_alert(&a.id, "me").await;

    let stats = alerting.get_alert_stats(Duration::from_secs(3600));
    assert_eq!(stats.total_alerts, 2);
    assert_eq!(stats.by_severity.get(&Severity::High), Some(&1));
    assert_eq!(stats.by_status.get("acknowledged"), Some(&1));
    assert_eq!(stats.by_status.get("active"), Some(&1));
    let latency = stats.average_ack_latency_secs.unwrap();
    assert!((29.0..=40.0).contains(&latency), "latency {}", latency);
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let alerting = SecurityAlerting::with_senders(AlertingConfig::default(), SenderRegistry::new());
    alerting.send_alert("Old one", "x", Severity::Low, vec![], vec![]).await;
    alerting.send_alert("New and unrelated", "x", Severity::Low, vec![], vec![]).await;
    if let Some(old) = alerting.history.write().front_mut() {
        old.timestamp = old.timestamp - chrono::Duration::days(100);
    }

    assert_eq!(alerting.cleanup_old_alerts(90), 1);
    assert_eq!(alerting.cleanup_old_alerts(90), 0);
    assert_eq!(alerting.cleanup_expired_alerts(), 0);
    assert_eq!(alerting.alert_count(), 1);
}

// ============================================================================
// FAN-OUT
// ============================================================================

#[tokio::test]
async fn test_fan_out_isolation() {
    let mail = Arc::new(FakeMail::default());
    let mut registry = SenderRegistry::new();
    registry.register(ChannelType::Webhook, Arc::new(FailingSender));
    registry.register(ChannelType::Email, Arc::new(EmailSender::new(Some(mail.clone() as Arc<dyn MailTransport>))));

    let alerting = SecurityAlerting::with_senders(AlertingConfig::default(), registry);
    let hook = alerting.add_channel(AlertChannel::new("hook", Severity::Medium, webhook_config()));
    let email = alerting.add_channel(AlertChannel::new("mail", Severity::Medium, email_config()));

    let alert = alerting.send_alert("Payment fraud", "card testing", Severity::High, vec![], vec![]).await;
    assert!(alert.is_some());

    let sent = mail.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.host, "smtp.local");
    assert_eq!(sent[0].1.to, vec!["soc@local".to_string()]);
    assert!(sent[0].1.subject.starts_with("[HIGH]"));
    drop(sent);

    let stats = alerting.delivery_stats();
    let hook_stats = stats.iter().find(|d| d.channel_id == hook).unwrap();
    let email_stats = stats.iter().find(|d| d.channel_id == email).unwrap();
    assert_eq!((hook_stats.sent, hook_stats.failed), (0, 1));
    assert!(hook_stats.last_error.as_deref().unwrap().contains("connection refused"));
    assert_eq!((email_stats.sent, email_stats.failed), (1, 0));
}

#[tokio::test]
async fn test_slow_channel_times_out() {
    let config = AlertingConfig { channel_timeout_secs: 1, ..Default::default() };
    let recorder = Arc::new(RecordingSender::default());
    let mut registry = SenderRegistry::new();
    registry.register(ChannelType::Slack, Arc::new(SlowSender));
    registry.register(ChannelType::Webhook, recorder.clone());

    let alerting = SecurityAlerting::with_senders(config, registry);
    alerting.add_channel(AlertChannel::new(
        "slack",
        Severity::Low,
        ChannelConfig::Slack {
            webhook_url: "http://127.0.0.1:9/slack".into(),
            channel: None,
            username: "Security Monitor".into(),
            icon_emoji: ":rotating_light:".into(),
        },
    ));
    alerting.add_channel(AlertChannel::new("hook", Severity::Low, webhook_config()));

    let started = std::time::Instant::now();
    alerting.send_alert("Slow", "x", Severity::Medium, vec![], vec![]).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(recorder.count(), 1);

    let slow = alerting.delivery_stats().into_iter().find(|d| d.channel_type == ChannelType::Slack).unwrap();
    assert_eq!(slow.failed, 1);
}

#[tokio::test]
async fn test_email_without_transport_is_config_error() {
    let mut registry = SenderRegistry::new();
    registry.register(ChannelType::Email, Arc::new(EmailSender::new(None)));
    let alerting = SecurityAlerting::with_senders(AlertingConfig::default(), registry);
    let id = alerting.add_channel(AlertChannel::new("mail", Severity::Low, email_config()));

    assert!(alerting.send_alert("No transport", "x", Severity::High, vec![], vec![]).await.is_some());
    let err = alerting.test_channel(&id).await.unwrap_err();
    assert!(matches!(err, AlertError::Configuration(_)));
    assert_eq!(alerting.delivery_stats()[0].failed, 2);
}

#[tokio::test]
async fn test_default_alerting_delivers_mail_over_smtp() {
    let mut config = AlertingConfig::default();
    config.channel_timeout_secs = 2;
    let alerting = SecurityAlerting::new(config);
    let id = alerting.add_channel(AlertChannel::new("mail", Severity::Low, ChannelConfig::Email {
        smtp_host: "127.0.0.1".into(),
        smtp_port: 9,
        username: None,
        password: None,
        from: "secmon@example.com".into(),
        recipients: vec!["soc@example.com".into()],
    }));

    // nothing listens on the discard port, so the SMTP client itself fails
    let err = alerting.test_channel(&id).await.unwrap_err();
    assert!(matches!(err, AlertError::Mail(_) | AlertError::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn test_test_channel() {
    let sender = Arc::new(RecordingSender::default());
    let alerting = SecurityAlerting::with_senders(AlertingConfig::default(), recording_registry(sender.clone()));
    let id = alerting.add_channel(AlertChannel::new("pd", Severity::Critical, ChannelConfig::PagerDuty {
        integration_key: "abc".into(),
    }));

    // threshold is ignored for test alerts
    alerting.test_channel(&id).await.unwrap();
    assert_eq!(sender.count(), 1);
    assert_eq!(alerting.alert_count(), 0);
    assert!(matches!(
        alerting.test_channel("chan_missing").await,
        Err(AlertError::ChannelNotFound(_))
    ));
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[tokio::test]
async fn test_channel_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let config = AlertingConfig {
        channels_path: Some(dir.path().join("channels.json")),
        ..Default::default()
    };

    let alerting = SecurityAlerting::with_senders(config.clone(), SenderRegistry::new());
    let keep = alerting.add_channel(AlertChannel::new("keep", Severity::High, webhook_config()));
    let drop_id = alerting.add_channel(AlertChannel::new("drop", Severity::Low, email_config()));
    alerting.update_channel(&keep, ChannelUpdate {
        severity_threshold: Some(Severity::Critical),
        ..Default::default()
    });
    assert!(alerting.remove_channel(&drop_id));
    assert!(!alerting.remove_channel(&drop_id));

    let reloaded = SecurityAlerting::with_senders(config, SenderRegistry::new());
    let channels = reloaded.get_channels();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].id, keep);
    assert_eq!(channels[0].severity_threshold, Severity::Critical);
}

#[tokio::test]
async fn test_alerts_mirrored_to_store() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let alerting = SecurityAlerting::with_senders(AlertingConfig::default(), SenderRegistry::new())
        .with_store(store.clone());

    let alert = alerting.send_alert("Mirrored", "x", Severity::High, vec![], vec![]).await.unwrap();
    alerting.acknowledge_alert(&alert.id, "ops").await;

    let stored: SecurityAlert = get_json(store.as_ref(), &format!("alert:{}", alert.id)).await.unwrap().unwrap();
    assert_eq!(stored.status, AlertStatus::Acknowledged);
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[test]
fn test_slack_payload() {
    let config = ChannelConfig::Slack {
        webhook_url: "https://hooks.slack.test/x".into(),
        channel: Some("#sec".into()),
        username: "Security Monitor".into(),
        icon_emoji: ":rotating_light:".into(),
    };
    let body = format_slack(&config, &sample_alert());
    assert_eq!(body["channel"], "#sec");
    assert_eq!(body["attachments"][0]["color"], Severity::High.color());
    assert_eq!(body["attachments"][0]["title"], "Brute force <detected>");
}

#[test]
fn test_pagerduty_payload() {
    let alert = sample_alert();
    let body = format_pagerduty("routing-key", &alert);
    assert_eq!(body["event_action"], "trigger");
    assert_eq!(body["routing_key"], "routing-key");
    assert_eq!(body["dedup_key"], format!("secmon-{}", alert.id));
    assert_eq!(body["payload"]["severity"], "error");
    assert_eq!(body["payload"]["custom_details"]["related_event_ids"][0], alert.related_events[0].id);
}

#[test]
fn test_webhook_and_email_payloads() {
    let alert = sample_alert();
    let body = format_webhook(&alert);
    assert_eq!(body["alert"]["id"], alert.id);
    assert_eq!(body["alert"]["status"], "active");

    let html = format_email_html(&alert);
    assert!(html.contains("Brute force &lt;detected&gt;"));
    assert!(html.contains("6 failures &amp; counting"));
    assert!(html.contains("&lt;script&gt;"));
    assert!(html.contains("<li>Lock the account</li>"));
}
