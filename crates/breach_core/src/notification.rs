use std::collections::BTreeSet;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::DeadlinePolicy;
use crate::deadline::compute_deadline;
use crate::domain::{DataCategory, Incident, NotificationPayload, Severity};
use crate::error::AppError;

/// Affected-individual count above which notification is mandatory.
pub const AFFECTED_INDIVIDUALS_THRESHOLD: u64 = 100;

/// Categories whose exposure alone makes notification mandatory.
pub const SENSITIVE_CATEGORIES: [DataCategory; 2] = [DataCategory::Health, DataCategory::Biometric];

pub fn requires_notification_for(
    severity: Severity,
    estimated_affected_individuals: u64,
    categories: &BTreeSet<DataCategory>,
) -> bool {
    severity >= Severity::High
        || estimated_affected_individuals > AFFECTED_INDIVIDUALS_THRESHOLD
        || SENSITIVE_CATEGORIES.iter().any(|c| categories.contains(c))
}

pub fn requires_notification(incident: &Incident) -> bool {
    requires_notification_for(
        incident.severity,
        incident.estimated_affected_individuals,
        &incident.affected_data_categories,
    )
}

/// Recompute `notification_required` and its deadline from the causal fields.
///
/// No-op once the incident has been notified: the obligation is frozen at that point.
/// Returns whether anything changed.
pub fn refresh_requirement(incident: &mut Incident, policy: &DeadlinePolicy) -> bool {
    if incident.notified {
        return false;
    }
    let required = requires_notification(incident);
    let deadline = required.then(|| compute_deadline(incident.discovered_at, policy.window()));
    let changed =
        required != incident.notification_required || deadline != incident.notification_deadline;
    incident.notification_required = required;
    incident.notification_deadline = deadline;
    changed
}

#[derive(Serialize)]
struct DigestPayload<'a> {
    authority_reference: Option<&'a str>,
    summary: Option<&'a str>,
}

/// Stable SHA-256 of a notification payload, used to spot divergent repeat filings.
pub fn payload_digest(payload: &NotificationPayload) -> Result<String, AppError> {
    let canonical = DigestPayload {
        authority_reference: payload
            .authority_reference
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty()),
        summary: payload
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty()),
    };
    let json = serde_json::to_string(&canonical).map_err(|e| {
        AppError::new(
            "NOTIFICATION_DIGEST_FAILED",
            "Failed to serialize notification payload",
        )
        .with_details(e.to_string())
    })?;
    Ok(hex::encode(Sha256::digest(json.as_bytes())))
}
