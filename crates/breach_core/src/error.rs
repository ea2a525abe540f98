use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{FieldViolation, IncidentId, IncidentStatus};

/// Wire-facing error: a stable `code` for callers to branch on, plus whether a retry can help.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Storage failure carrying the underlying driver error as details.
    pub fn storage(
        code: impl Into<String>,
        message: impl Into<String>,
        cause: impl fmt::Display,
    ) -> Self {
        Self::new(code, message).with_details(cause.to_string())
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClosureBlockReason {
    MissingReport,
    PendingNotification,
}

impl ClosureBlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClosureBlockReason::MissingReport => "missing report",
            ClosureBlockReason::PendingNotification => "pending mandatory notification",
        }
    }
}

/// Outcome taxonomy of every engine operation.
///
/// `Conflict` is produced only by repositories (lost update) and is handed back untouched so the
/// caller can reload and retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    Validation(Vec<FieldViolation>),
    NotFound(IncidentId),
    IllegalTransition {
        from: IncidentStatus,
        to: IncidentStatus,
    },
    ClosureBlocked {
        reason: ClosureBlockReason,
    },
    /// Resolution needs at least one recorded containment measure.
    ResolutionBlocked,
    NotRequired(IncidentId),
    Conflict(IncidentId),
    Storage(AppError),
}

impl LifecycleError {
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            LifecycleError::Validation(v) => v,
            _ => &[],
        }
    }

    pub fn code(&self) -> &str {
        match self {
            LifecycleError::Validation(_) => "VALIDATION_FAILED",
            LifecycleError::NotFound(_) => "INCIDENT_NOT_FOUND",
            LifecycleError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            LifecycleError::ClosureBlocked { .. } => "CLOSURE_BLOCKED",
            LifecycleError::ResolutionBlocked => "RESOLUTION_BLOCKED",
            LifecycleError::NotRequired(_) => "NOTIFICATION_NOT_REQUIRED",
            LifecycleError::Conflict(_) => "CONFLICT",
            LifecycleError::Storage(e) => &e.code,
        }
    }
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::Validation(violations) => {
                let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
                write!(f, "Validation failed for: {}", fields.join(", "))
            }
            LifecycleError::NotFound(id) => write!(f, "Incident {id} not found"),
            LifecycleError::IllegalTransition { from, to } => {
                write!(f, "Illegal status transition from {from} to {to}")
            }
            LifecycleError::ClosureBlocked { reason } => {
                write!(f, "Closure blocked: {}", reason.as_str())
            }
            LifecycleError::ResolutionBlocked => {
                write!(f, "Resolution blocked: no containment measures recorded")
            }
            LifecycleError::NotRequired(id) => {
                write!(f, "Incident {id} does not require regulatory notification")
            }
            LifecycleError::Conflict(id) => {
                write!(f, "Incident {id} was modified concurrently")
            }
            LifecycleError::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LifecycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LifecycleError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AppError> for LifecycleError {
    fn from(e: AppError) -> Self {
        LifecycleError::Storage(e)
    }
}

impl From<LifecycleError> for AppError {
    fn from(e: LifecycleError) -> Self {
        let code = e.code().to_string();
        let message = e.to_string();
        match e {
            LifecycleError::Storage(inner) => inner,
            LifecycleError::Validation(violations) => {
                let details = serde_json::to_string(&violations)
                    .unwrap_or_else(|_| format!("{} violation(s)", violations.len()));
                AppError::new(code, message).with_details(details)
            }
            LifecycleError::IllegalTransition { from, to } => AppError::new(code, message)
                .with_details(format!("from={from}; to={to}")),
            LifecycleError::ClosureBlocked { reason } => {
                AppError::new(code, message).with_details(reason.as_str())
            }
            LifecycleError::NotFound(id) | LifecycleError::NotRequired(id) => {
                AppError::new(code, message).with_details(format!("id={id}"))
            }
            LifecycleError::Conflict(id) => AppError::new(code, message)
                .with_details(format!("id={id}"))
                .with_retryable(true),
            LifecycleError::ResolutionBlocked => AppError::new(code, message),
        }
    }
}
