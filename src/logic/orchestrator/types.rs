//! Pipeline Outcome & Status Report Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::alerting::AlertStats;
use crate::logic::behavior::{BehaviorStats, ThreatAssessment};
use crate::logic::events::{SecurityAlert, SecurityEvent};
use crate::logic::incident::{Incident, IncidentStats};
use crate::logic::monitor::{EventStatistics, MonitorStatus};
use crate::logic::threat::ThreatStats;

/// Result of pushing one security event through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub event: SecurityEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_alert: Option<SecurityAlert>,
    pub incidents: Vec<Incident>,
}

/// Result of pushing one user action through the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<ThreatAssessment>,
    /// Behavior and threat events raised for this action
    pub events: Vec<SecurityEvent>,
    pub alerts: Vec<SecurityAlert>,
    pub incidents: Vec<Incident>,
}

impl PipelineOutcome {
    pub fn is_clean(&self) -> bool {
        self.assessment.is_none() && self.events.is_empty()
    }
}

/// What `SecurityPipeline::restore` brought back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub events: usize,
    pub incidents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl ControlCheck {
    pub fn new(name: &str, passed: bool, detail: String) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPosture {
    /// Every control passes and no critical incident is open
    Strong,
    Adequate,
    Weak,
}

impl SecurityPosture {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityPosture::Strong => "strong",
            SecurityPosture::Adequate => "adequate",
            SecurityPosture::Weak => "weak",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub monitor: MonitorStatus,
    pub events_24h: EventStatistics,
    pub alerts_24h: AlertStats,
    pub behavior: BehaviorStats,
    pub threat: ThreatStats,
    pub incidents: IncidentStats,
    pub controls: Vec<ControlCheck>,
    pub posture: SecurityPosture,
}
