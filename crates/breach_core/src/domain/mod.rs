use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Opaque incident identifier. Assigned once at creation and never changed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IncidentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for IncidentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    DataBreach,
    UnauthorizedAccess,
    DataLoss,
    Ransomware,
    Phishing,
    Malware,
    InsiderThreat,
    SystemFailure,
    HumanError,
    PhysicalTheft,
    Other,
}

impl IncidentType {
    pub const ALL: [IncidentType; 11] = [
        IncidentType::DataBreach,
        IncidentType::UnauthorizedAccess,
        IncidentType::DataLoss,
        IncidentType::Ransomware,
        IncidentType::Phishing,
        IncidentType::Malware,
        IncidentType::InsiderThreat,
        IncidentType::SystemFailure,
        IncidentType::HumanError,
        IncidentType::PhysicalTheft,
        IncidentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::DataBreach => "data_breach",
            IncidentType::UnauthorizedAccess => "unauthorized_access",
            IncidentType::DataLoss => "data_loss",
            IncidentType::Ransomware => "ransomware",
            IncidentType::Phishing => "phishing",
            IncidentType::Malware => "malware",
            IncidentType::InsiderThreat => "insider_threat",
            IncidentType::SystemFailure => "system_failure",
            IncidentType::HumanError => "human_error",
            IncidentType::PhysicalTheft => "physical_theft",
            IncidentType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    Identification,
    Contact,
    Location,
    Financial,
    Health,
    Biometric,
    Behavioral,
    Professional,
    Educational,
    Other,
}

impl DataCategory {
    pub const ALL: [DataCategory; 10] = [
        DataCategory::Identification,
        DataCategory::Contact,
        DataCategory::Location,
        DataCategory::Financial,
        DataCategory::Health,
        DataCategory::Biometric,
        DataCategory::Behavioral,
        DataCategory::Professional,
        DataCategory::Educational,
        DataCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::Identification => "identification",
            DataCategory::Contact => "contact",
            DataCategory::Location => "location",
            DataCategory::Financial => "financial",
            DataCategory::Health => "health",
            DataCategory::Biometric => "biometric",
            DataCategory::Behavioral => "behavioral",
            DataCategory::Professional => "professional",
            DataCategory::Educational => "educational",
            DataCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Escalated,
    Resolved,
    Closed,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 5] = [
        IncidentStatus::Open,
        IncidentStatus::Investigating,
        IncidentStatus::Escalated,
        IncidentStatus::Resolved,
        IncidentStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Escalated => "escalated",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Closed)
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical privacy incident.
///
/// Notes:
/// - All timestamps are UTC; local-time rendering belongs to the caller.
/// - `notification_required` and `notification_deadline` are derived and always move together.
/// - `version` is the optimistic-locking counter owned by the repository (0 = never stored).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Incident {
    pub id: IncidentId,
    pub title: String,
    pub description: String,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub affected_data_categories: BTreeSet<DataCategory>,
    pub estimated_affected_individuals: u64,

    #[serde(with = "time::serde::rfc3339")]
    pub discovered_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub occurred_at: Option<OffsetDateTime>,

    pub status: IncidentStatus,

    pub notification_required: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub notification_deadline: Option<OffsetDateTime>,
    pub notified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub notified_at: Option<OffsetDateTime>,
    pub notification_reference: Option<String>,
    pub notification_digest: Option<String>,

    pub containment_measures: Vec<String>,
    pub closure_report: Option<String>,

    pub created_by: String,
    pub updated_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,

    pub version: i64,
}

impl Incident {
    pub fn has_closure_report(&self) -> bool {
        self.closure_report
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty())
    }

    /// True while a mandatory notification has not been sent yet.
    pub fn notification_pending(&self) -> bool {
        self.notification_required && !self.notified
    }

    /// True when the notification went out after the deadline had already passed.
    pub fn notified_late(&self) -> bool {
        match (self.notified_at, self.notification_deadline) {
            (Some(at), Some(deadline)) => at > deadline,
            _ => false,
        }
    }
}

/// Caller-supplied input for `IncidentService::create`.
///
/// Numeric and timestamp fields are kept loose here so that validation can report every
/// violated field at once instead of failing on the first bad value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentDraft {
    pub title: String,
    pub description: String,
    pub incident_type: IncidentType,
    pub severity: Severity,
    #[serde(default)]
    pub affected_data_categories: BTreeSet<DataCategory>,
    pub estimated_affected_individuals: i64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub discovered_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub occurred_at: Option<OffsetDateTime>,
}

/// Causal-field changes for `IncidentService::reassess`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reassessment {
    pub incident_type: Option<IncidentType>,
    pub severity: Option<Severity>,
    pub affected_data_categories: Option<BTreeSet<DataCategory>>,
    pub estimated_affected_individuals: Option<i64>,
}

/// What the host recorded when it filed the regulatory notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPayload {
    /// Protocol/receipt number issued by the authority, if any.
    pub authority_reference: Option<String>,
    pub summary: Option<String>,
}

/// Identity of whoever is driving the current call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}
