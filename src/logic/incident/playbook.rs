//! Response Playbooks
//!
//! One ordered playbook per incident category. Automated and notification steps
//! run on incident creation; manual steps are handed to a responder.
//! `dependencies` name step ids that must complete first.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::types::IncidentCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomatedAction {
    /// Block every `ip:` asset
    NetworkContainment,
    /// Quarantine every `system:` asset
    SystemIsolation,
    /// Snapshot host info and related log lines into the evidence list
    EvidenceCollection,
    /// Send to the stakeholder distribution list
    StakeholderNotification,
}

impl AutomatedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutomatedAction::NetworkContainment => "network_containment",
            AutomatedAction::SystemIsolation => "system_isolation",
            AutomatedAction::EvidenceCollection => "evidence_collection",
            AutomatedAction::StakeholderNotification => "stakeholder_notification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "action", rename_all = "snake_case")]
pub enum StepType {
    Automated(AutomatedAction),
    Notification,
    Manual,
}

impl StepType {
    /// What the engine runs for this step, `None` for manual work
    pub fn automated_action(&self) -> Option<AutomatedAction> {
        match self {
            StepType::Automated(action) => Some(*action),
            StepType::Notification => Some(AutomatedAction::StakeholderNotification),
            StepType::Manual => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookStep {
    pub id: String,
    pub name: String,
    pub description: String,
    pub step_type: StepType,
    /// Role that owns the step
    pub responsible_team: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playbook {
    pub id: String,
    pub name: String,
    pub category: IncidentCategory,
    pub steps: Vec<PlaybookStep>,
    /// Roles to involve, in order, when the response stalls
    #[serde(default)]
    pub escalation_path: Vec<String>,
    #[serde(default)]
    pub required_resources: Vec<String>,
}

impl Playbook {
    pub fn step(&self, step_id: &str) -> Option<&PlaybookStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Every role that owns a step
    pub fn response_team(&self) -> BTreeSet<String> {
        self.steps.iter().map(|s| s.responsible_team.clone()).collect()
    }
}

fn step(
    id: &str,
    name: &str,
    description: &str,
    team: &str,
    step_type: StepType,
    dependencies: &[&str],
) -> PlaybookStep {
    PlaybookStep {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        step_type,
        responsible_team: team.to_string(),
        dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
    }
}

fn playbook(
    category: IncidentCategory,
    name: &str,
    steps: Vec<PlaybookStep>,
    escalation_path: &[&str],
    required_resources: &[&str],
) -> Playbook {
    Playbook {
        id: format!("pb-{}", category.as_str()),
        name: name.to_string(),
        category,
        steps,
        escalation_path: escalation_path.iter().map(|r| r.to_string()).collect(),
        required_resources: required_resources.iter().map(|r| r.to_string()).collect(),
    }
}

const SECURITY: &str = "security_operations";
const INFRA: &str = "infrastructure";
const IDENTITY: &str = "identity_access";
const FINANCE: &str = "finance";
const LEGAL: &str = "legal";
const HR: &str = "human_resources";
const SUPPORT: &str = "customer_support";
const COMMS: &str = "incident_command";

use AutomatedAction::*;
use StepType::{Automated, Manual, Notification};

/// Built-in playbooks, one per category
pub fn default_playbooks() -> Vec<Playbook> {
    vec![
        playbook(
            IncidentCategory::UnauthorizedAccess,
            "Unauthorized access response",
            vec![
                step("evidence", "Collect authentication evidence", "Snapshot the host and related auth events", SECURITY, Automated(EvidenceCollection), &[]),
                step("contain", "Block offending addresses", "Add every source address to the block list", INFRA, Automated(NetworkContainment), &["evidence"]),
                step("notify", "Notify security team", "Send the incident summary to stakeholders", COMMS, Notification, &[]),
                step("reset", "Reset targeted credentials", "Force password reset and revoke tokens for targeted accounts", IDENTITY, Manual, &["contain"]),
                step("review", "Review successful logins", "Check for logins that succeeded from the same sources", SECURITY, Manual, &["reset"]),
            ],
            &[SECURITY, "security_lead", "ciso"],
            &["authentication logs", "firewall access"],
        ),
        playbook(
            IncidentCategory::AccountCompromise,
            "Account compromise response",
            vec![
                step("evidence", "Snapshot account activity", "Preserve the account's recent events", SECURITY, Automated(EvidenceCollection), &[]),
                step("contain", "Block session source addresses", "Block addresses used by the suspicious sessions", INFRA, Automated(NetworkContainment), &["evidence"]),
                step("notify", "Notify stakeholders", "Send the incident summary to stakeholders", COMMS, Automated(StakeholderNotification), &[]),
                step("revoke", "Revoke sessions and reset credentials", "Terminate all sessions, rotate credentials and API keys", IDENTITY, Manual, &["contain"]),
                step("contact", "Contact account owner", "Confirm activity with the owner out of band", SUPPORT, Manual, &["revoke"]),
            ],
            &[SECURITY, "security_lead", "ciso"],
            &["session store access", "identity provider admin"],
        ),
        playbook(
            IncidentCategory::DataBreach,
            "Data breach response",
            vec![
                step("evidence", "Preserve access logs", "Snapshot hosts and data access events", SECURITY, Automated(EvidenceCollection), &[]),
                step("contain", "Cut off exfiltration sources", "Block addresses that pulled the data", INFRA, Automated(NetworkContainment), &["evidence"]),
                step("isolate", "Isolate affected systems", "Quarantine hosts holding the exposed data", INFRA, Automated(SystemIsolation), &["evidence"]),
                step("notify", "Notify stakeholders and legal", "Send the incident summary to stakeholders", COMMS, Notification, &[]),
                step("scope", "Determine exposed records", "Identify which records and customers are affected", SECURITY, Manual, &["contain", "isolate"]),
                step("disclose", "Prepare regulatory disclosure", "Draft notifications within regulatory deadlines", LEGAL, Manual, &["scope"]),
            ],
            &[SECURITY, "ciso", LEGAL, "executive_team"],
            &["database audit logs", "forensic storage", "legal counsel"],
        ),
        playbook(
            IncidentCategory::PaymentFraud,
            "Payment fraud response",
            vec![
                step("evidence", "Capture payment events", "Preserve the payment and webhook events", SECURITY, Automated(EvidenceCollection), &[]),
                step("contain", "Block fraudulent sources", "Block addresses behind the fraudulent payments", INFRA, Automated(NetworkContainment), &["evidence"]),
                step("notify", "Notify finance and security", "Send the incident summary to stakeholders", COMMS, Notification, &[]),
                step("freeze", "Freeze affected payment methods", "Suspend cards and accounts involved", FINANCE, Manual, &["contain"]),
                step("reconcile", "Reconcile with payment provider", "Match transactions and file disputes with the provider", FINANCE, Manual, &["freeze"]),
            ],
            &[FINANCE, SECURITY, "cfo"],
            &["payment provider dashboard", "transaction ledger"],
        ),
        playbook(
            IncidentCategory::DenialOfService,
            "Denial of service response",
            vec![
                step("contain", "Block abusive addresses", "Add the flooding addresses to the block list", INFRA, Automated(NetworkContainment), &[]),
                step("evidence", "Capture traffic logs", "Snapshot hosts and rate-limit events", SECURITY, Automated(EvidenceCollection), &[]),
                step("notify", "Notify operations", "Send the incident summary to stakeholders", COMMS, Notification, &[]),
                step("scale", "Scale or shield affected services", "Add capacity or enable upstream DDoS protection", INFRA, Manual, &["contain"]),
            ],
            &[INFRA, SECURITY, "engineering_lead"],
            &["CDN or WAF console", "autoscaling capacity"],
        ),
        playbook(
            IncidentCategory::InsiderThreat,
            "Insider threat response",
            vec![
                step("evidence", "Preserve user activity", "Snapshot hosts and the user's recent events", SECURITY, Automated(EvidenceCollection), &[]),
                step("notify", "Notify security leadership", "Send the incident summary to stakeholders", COMMS, Notification, &["evidence"]),
                step("restrict", "Restrict user privileges", "Reduce the user's access to the minimum", IDENTITY, Manual, &["evidence"]),
                step("interview", "Coordinate with HR and legal", "Plan the follow-up with HR and legal", HR, Manual, &["restrict"]),
            ],
            &[SECURITY, "ciso", HR, LEGAL],
            &["user activity logs", "HR case file"],
        ),
        playbook(
            IncidentCategory::SystemCompromise,
            "System compromise response",
            vec![
                step("evidence", "Snapshot host state", "Capture host facts and related events", SECURITY, Automated(EvidenceCollection), &[]),
                step("isolate", "Isolate affected hosts", "Quarantine hosts named in the event", INFRA, Automated(SystemIsolation), &["evidence"]),
                step("contain", "Block attacker addresses", "Add attacker addresses to the block list", INFRA, Automated(NetworkContainment), &["evidence"]),
                step("notify", "Notify stakeholders", "Send the incident summary to stakeholders", COMMS, Notification, &[]),
                step("eradicate", "Patch and rebuild hosts", "Patch the exploited flaw and rebuild from clean images", INFRA, Manual, &["isolate", "contain"]),
                step("rotate", "Rotate reachable secrets", "Rotate every secret reachable from the hosts", SECURITY, Manual, &["eradicate"]),
            ],
            &[SECURITY, INFRA, "ciso"],
            &["host console access", "clean system images", "secrets manager"],
        ),
        playbook(
            IncidentCategory::PolicyViolation,
            "Policy violation review",
            vec![
                step("evidence", "Record the change", "Snapshot the host and the change event", SECURITY, Automated(EvidenceCollection), &[]),
                step("review", "Review with change owner", "Confirm or revert the change with its owner", SECURITY, Manual, &["evidence"]),
            ],
            &[SECURITY, "compliance"],
            &["change log"],
        ),
    ]
}
