//! Channel Senders
//!
//! One sender per channel type, each formatting its own payload:
//! - Email: HTML body through a `MailTransport`
//! - Slack: attachment with a severity-colored sidebar
//! - PagerDuty: Events API v2 `trigger`, `dedup_key` derived from the alert id
//! - Webhook: raw alert JSON with configurable method and headers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};

use super::types::AlertError;
use crate::constants::{APP_NAME, APP_VERSION, PAGERDUTY_EVENTS_URL};
use crate::logic::events::{AlertChannel, ChannelConfig, ChannelType, SecurityAlert, Severity};

// ============================================================================
// TRAITS
// ============================================================================

/// Delivers one alert to one channel
#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, channel: &AlertChannel, alert: &SecurityAlert) -> Result<(), AlertError>;
}

/// SMTP endpoint taken from the channel config
#[derive(Debug, Clone, PartialEq)]
pub struct SmtpTarget {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

/// Outbound mail abstraction
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_mail(&self, target: &SmtpTarget, message: &MailMessage) -> Result<(), AlertError>;
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Maps a channel type to the sender that serves it
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<ChannelType, Arc<dyn AlertSender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP senders for Slack, PagerDuty and webhooks; email through `mail` if given
    pub fn http(mail: Option<Arc<dyn MailTransport>>, timeout: Duration) -> Self {
        let client = build_client(timeout);
        let mut registry = Self::new();
        registry.register(ChannelType::Email, Arc::new(EmailSender::new(mail)));
        registry.register(ChannelType::Slack, Arc::new(SlackSender::new(client.clone())));
        registry.register(ChannelType::PagerDuty, Arc::new(PagerDutySender::new(client.clone())));
        registry.register(ChannelType::Webhook, Arc::new(WebhookSender::new(client)));
        registry
    }

    pub fn register(&mut self, channel_type: ChannelType, sender: Arc<dyn AlertSender>) {
        self.senders.insert(channel_type, sender);
    }

    pub fn get(&self, channel_type: ChannelType) -> Option<Arc<dyn AlertSender>> {
        self.senders.get(&channel_type).cloned()
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(format!("{}/{}", APP_NAME, APP_VERSION))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        })
}

async fn post_json(
    client: &Client,
    method: Method,
    url: &str,
    headers: &HashMap<String, String>,
    body: &Value,
    channel: ChannelType,
) -> Result<(), AlertError> {
    let mut request = client.request(method, url).json(body);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AlertError::HttpStatus { channel, status: status.as_u16() });
    }
    Ok(())
}

// ============================================================================
// EMAIL
// ============================================================================

pub struct EmailSender {
    transport: Option<Arc<dyn MailTransport>>,
}

impl EmailSender {
    pub fn new(transport: Option<Arc<dyn MailTransport>>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AlertSender for EmailSender {
    async fn send(&self, channel: &AlertChannel, alert: &SecurityAlert) -> Result<(), AlertError> {
        let ChannelConfig::Email { smtp_host, smtp_port, username, password, from, recipients } = &channel.config else {
            return Err(AlertError::Configuration(format!("channel {} is not an email channel", channel.id)));
        };
        let transport = self.transport.as_ref().ok_or_else(|| {
            AlertError::Configuration("no mail transport configured".to_string())
        })?;
        if recipients.is_empty() {
            return Err(AlertError::Configuration(format!("channel {} has no recipients", channel.id)));
        }

        let target = SmtpTarget {
            host: smtp_host.clone(),
            port: *smtp_port,
            username: username.clone(),
            password: password.clone(),
        };
        let message = MailMessage {
            from: from.clone(),
            to: recipients.clone(),
            subject: format!("[{}] {}", alert.severity.as_str().to_uppercase(), alert.title),
            html_body: format_email_html(alert),
        };
        transport.send_mail(&target, &message).await
    }
}

pub fn format_email_html(alert: &SecurityAlert) -> String {
    let actions: String = alert
        .recommended_actions
        .iter()
        .map(|a| format!("<li>{}</li>", escape_html(a)))
        .collect();
    let events: String = alert
        .related_events
        .iter()
        .map(|e| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                e.timestamp.to_rfc3339(),
                e.event_type,
                e.severity,
                escape_html(e.user_id.as_deref().unwrap_or("-")),
            )
        })
        .collect();

    format!(
        "<html><body>\
         <h2 style=\"color:{color}\">{title}</h2>\
         <p><strong>Severity:</strong> {severity}<br/><strong>Time:</strong> {time}<br/><strong>Alert ID:</strong> {id}</p>\
         <p>{description}</p>\
         <h3>Recommended actions</h3><ul>{actions}</ul>\
         <h3>Related events ({count})</h3>\
         <table><tr><th>Time</th><th>Type</th><th>Severity</th><th>User</th></tr>{events}</table>\
         </body></html>",
        color = alert.severity.color(),
        title = escape_html(&alert.title),
        severity = alert.severity,
        time = alert.timestamp.to_rfc3339(),
        id = alert.id,
        description = escape_html(&alert.description),
        actions = actions,
        count = alert.related_events.len(),
        events = events,
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============================================================================
// SLACK
// ============================================================================

pub struct SlackSender {
    client: Client,
}

impl SlackSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AlertSender for SlackSender {
    async fn send(&self, channel: &AlertChannel, alert: &SecurityAlert) -> Result<(), AlertError> {
        let ChannelConfig::Slack { webhook_url, .. } = &channel.config else {
            return Err(AlertError::Configuration(format!("channel {} is not a slack channel", channel.id)));
        };
        let body = format_slack(&channel.config, alert);
        post_json(&self.client, Method::POST, webhook_url, &HashMap::new(), &body, ChannelType::Slack).await
    }
}

pub fn format_slack(config: &ChannelConfig, alert: &SecurityAlert) -> Value {
    let mut fields = vec![
        json!({ "title": "Severity", "value": alert.severity.as_str(), "short": true }),
        json!({ "title": "Alert ID", "value": alert.id, "short": true }),
    ];
    if !alert.related_events.is_empty() {
        fields.push(json!({
            "title": "Related events",
            "value": alert.related_events.len().to_string(),
            "short": true
        }));
    }
    if !alert.recommended_actions.is_empty() {
        fields.push(json!({
            "title": "Recommended actions",
            "value": alert.recommended_actions.iter().map(|a| format!("• {}", a)).collect::<Vec<_>>().join("\n"),
            "short": false
        }));
    }

    let mut body = json!({
        "attachments": [{
            "color": alert.severity.color(),
            "title": alert.title,
            "text": alert.description,
            "fields": fields,
            "ts": alert.timestamp.timestamp()
        }]
    });

    if let ChannelConfig::Slack { channel, username, icon_emoji, .. } = config {
        body["username"] = json!(username);
        body["icon_emoji"] = json!(icon_emoji);
        if let Some(c) = channel {
            body["channel"] = json!(c);
        }
    }
    body
}

// ============================================================================
// PAGERDUTY
// ============================================================================

pub struct PagerDutySender {
    client: Client,
    events_url: String,
}

impl PagerDutySender {
    pub fn new(client: Client) -> Self {
        Self::with_url(client, PAGERDUTY_EVENTS_URL)
    }

    pub fn with_url(client: Client, events_url: &str) -> Self {
        Self { client, events_url: events_url.to_string() }
    }
}

#[async_trait]
impl AlertSender for PagerDutySender {
    async fn send(&self, channel: &AlertChannel, alert: &SecurityAlert) -> Result<(), AlertError> {
        let ChannelConfig::PagerDuty { integration_key } = &channel.config else {
            return Err(AlertError::Configuration(format!("channel {} is not a pagerduty channel", channel.id)));
        };
        if integration_key.trim().is_empty() {
            return Err(AlertError::Configuration("empty PagerDuty integration key".to_string()));
        }
        let body = format_pagerduty(integration_key, alert);
        post_json(&self.client, Method::POST, &self.events_url, &HashMap::new(), &body, ChannelType::PagerDuty).await
    }
}

fn pagerduty_severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low => "info",
    }
}

pub fn format_pagerduty(integration_key: &str, alert: &SecurityAlert) -> Value {
    json!({
        "routing_key": integration_key,
        "event_action": "trigger",
        "dedup_key": format!("{}-{}", APP_NAME, alert.id),
        "payload": {
            "summary": alert.title,
            "source": APP_NAME,
            "severity": pagerduty_severity(alert.severity),
            "timestamp": alert.timestamp.to_rfc3339(),
            "custom_details": {
                "description": alert.description,
                "recommended_actions": alert.recommended_actions,
                "related_event_ids": alert.related_events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>()
            }
        }
    })
}

// ============================================================================
// GENERIC WEBHOOK
// ============================================================================

pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AlertSender for WebhookSender {
    async fn send(&self, channel: &AlertChannel, alert: &SecurityAlert) -> Result<(), AlertError> {
        let ChannelConfig::Webhook { url, method, headers } = &channel.config else {
            return Err(AlertError::Configuration(format!("channel {} is not a webhook channel", channel.id)));
        };
        let method = Method::from_bytes(method.trim().to_uppercase().as_bytes())
            .map_err(|_| AlertError::Configuration(format!("invalid HTTP method: {}", method)))?;
        let body = format_webhook(alert);
        post_json(&self.client, method, url, headers, &body, ChannelType::Webhook).await
    }
}

pub fn format_webhook(alert: &SecurityAlert) -> Value {
    json!({
        "type": "security_alert",
        "source": APP_NAME,
        "alert": alert
    })
}
