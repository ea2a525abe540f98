use std::collections::BTreeSet;

use time::{OffsetDateTime, UtcOffset};

use crate::domain::{
    Actor, DataCategory, FieldViolation, IncidentDraft, IncidentType, Reassessment, Severity,
};

/// Draft fields after validation, with loose types narrowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub title: String,
    pub description: String,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub affected_data_categories: BTreeSet<DataCategory>,
    pub estimated_affected_individuals: u64,
    pub discovered_at: OffsetDateTime,
    pub occurred_at: Option<OffsetDateTime>,
}

fn required_text(field: &str, value: &str, violations: &mut Vec<FieldViolation>) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        violations.push(FieldViolation::new(
            field,
            "VALIDATION_REQUIRED",
            format!("{field} is required"),
        ));
        return None;
    }
    Some(trimmed.to_string())
}

fn affected_count(raw: i64, violations: &mut Vec<FieldViolation>) -> Option<u64> {
    match u64::try_from(raw) {
        Ok(v) => Some(v),
        Err(_) => {
            violations.push(FieldViolation::new(
                "estimated_affected_individuals",
                "VALIDATION_NEGATIVE_COUNT",
                format!("estimated_affected_individuals must be >= 0 (got {raw})"),
            ));
            None
        }
    }
}

pub fn validate_actor(actor: &Actor, violations: &mut Vec<FieldViolation>) {
    if actor.id.trim().is_empty() {
        violations.push(FieldViolation::new(
            "actor",
            "VALIDATION_REQUIRED",
            "acting user is required",
        ));
    }
}

/// Validate a creation draft against `now`.
///
/// Every violated field is reported; validation never stops at the first problem.
pub fn validate_draft(
    draft: &IncidentDraft,
    actor: &Actor,
    now: OffsetDateTime,
) -> Result<ValidatedDraft, Vec<FieldViolation>> {
    let mut violations = Vec::new();

    validate_actor(actor, &mut violations);
    let title = required_text("title", &draft.title, &mut violations);
    let description = required_text("description", &draft.description, &mut violations);
    let affected = affected_count(draft.estimated_affected_individuals, &mut violations);

    let discovered_at = match draft.discovered_at {
        None => {
            violations.push(FieldViolation::new(
                "discovered_at",
                "VALIDATION_REQUIRED",
                "discovered_at is required",
            ));
            None
        }
        Some(at) if at > now => {
            violations.push(FieldViolation::new(
                "discovered_at",
                "VALIDATION_IN_FUTURE",
                format!("discovered_at must not be in the future (value={at}; now={now})"),
            ));
            None
        }
        Some(at) => Some(at.to_offset(UtcOffset::UTC)),
    };

    if let (Some(occurred), Some(discovered)) = (draft.occurred_at, draft.discovered_at) {
        if occurred > discovered {
            violations.push(FieldViolation::new(
                "occurred_at",
                "VALIDATION_TS_ORDER_VIOLATION",
                format!(
                    "occurred_at must be <= discovered_at \
                     (occurred_at={occurred}; discovered_at={discovered})"
                ),
            ));
        }
    }

    match (title, description, affected, discovered_at) {
        (Some(title), Some(description), Some(affected), Some(discovered_at))
            if violations.is_empty() =>
        {
            Ok(ValidatedDraft {
                title,
                description,
                incident_type: draft.incident_type,
                severity: draft.severity,
                affected_data_categories: draft.affected_data_categories.clone(),
                estimated_affected_individuals: affected,
                discovered_at,
                occurred_at: draft.occurred_at.map(|at| at.to_offset(UtcOffset::UTC)),
            })
        }
        _ => Err(violations),
    }
}

/// Trimmed containment measures; the batch must hold at least one non-blank entry and no blanks.
pub fn validate_measures(measures: &[String]) -> Result<Vec<String>, Vec<FieldViolation>> {
    let mut violations = Vec::new();
    if measures.is_empty() {
        violations.push(FieldViolation::new(
            "containment_measures",
            "VALIDATION_REQUIRED",
            "at least one containment measure is required",
        ));
    }
    let mut out = Vec::with_capacity(measures.len());
    for (idx, m) in measures.iter().enumerate() {
        let trimmed = m.trim();
        if trimmed.is_empty() {
            violations.push(FieldViolation::new(
                format!("containment_measures[{idx}]"),
                "VALIDATION_REQUIRED",
                "containment measure must not be blank",
            ));
        } else {
            out.push(trimmed.to_string());
        }
    }
    if violations.is_empty() {
        Ok(out)
    } else {
        Err(violations)
    }
}

pub fn validate_reassessment(changes: &Reassessment) -> Result<Option<u64>, Vec<FieldViolation>> {
    let mut violations = Vec::new();
    let affected = changes
        .estimated_affected_individuals
        .and_then(|raw| affected_count(raw, &mut violations));
    if violations.is_empty() {
        Ok(affected)
    } else {
        Err(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

    fn draft() -> IncidentDraft {
        IncidentDraft {
            title: "  Phishing campaign ".to_string(),
            description: "Credentials harvested".to_string(),
            incident_type: IncidentType::Phishing,
            severity: Severity::Medium,
            affected_data_categories: BTreeSet::new(),
            estimated_affected_individuals: 12,
            discovered_at: Some(datetime!(2026-03-01 09:00 UTC)),
            occurred_at: Some(datetime!(2026-02-28 22:00 UTC)),
        }
    }

    #[test]
    fn valid_draft_is_trimmed() {
        let v = validate_draft(&draft(), &Actor::new("dpo"), NOW).expect("valid");
        assert_eq!(v.title, "Phishing campaign");
        assert_eq!(v.estimated_affected_individuals, 12);
    }

    #[test]
    fn reports_every_violated_field() {
        let mut d = draft();
        d.title = " ".to_string();
        d.description = String::new();
        d.estimated_affected_individuals = -5;
        d.discovered_at = None;

        let violations = validate_draft(&d, &Actor::new(""), NOW).unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "actor",
                "title",
                "description",
                "estimated_affected_individuals",
                "discovered_at"
            ]
        );
    }

    #[test]
    fn future_discovery_and_inverted_occurrence_are_rejected() {
        let mut d = draft();
        d.discovered_at = Some(datetime!(2026-03-01 12:00:01 UTC));
        d.occurred_at = Some(datetime!(2026-03-02 00:00 UTC));
        let violations = validate_draft(&d, &Actor::new("dpo"), NOW).unwrap_err();
        let codes: Vec<&str> = violations.iter().map(|v| v.code.as_str()).collect();
        assert_eq!(
            codes,
            vec!["VALIDATION_IN_FUTURE", "VALIDATION_TS_ORDER_VIOLATION"]
        );
    }

    #[test]
    fn draft_timestamps_are_normalized_to_utc() {
        let mut d = draft();
        d.discovered_at = Some(datetime!(2026-03-01 06:00 -03:00));
        d.occurred_at = Some(datetime!(2026-02-28 19:00 -03:00));
        let v = validate_draft(&d, &Actor::new("dpo"), NOW).expect("valid");
        assert_eq!(v.discovered_at.offset(), UtcOffset::UTC);
        assert_eq!(v.discovered_at, datetime!(2026-03-01 09:00 UTC));
        assert_eq!(v.occurred_at.map(|t| t.offset()), Some(UtcOffset::UTC));
    }

    #[test]
    fn discovery_exactly_now_is_allowed() {
        let mut d = draft();
        d.discovered_at = Some(NOW);
        assert!(validate_draft(&d, &Actor::new("dpo"), NOW).is_ok());
    }

    #[test]
    fn measures_reject_empty_batches_and_blank_entries() {
        assert!(validate_measures(&[]).is_err());
        let violations =
            validate_measures(&["Reset passwords".to_string(), "  ".to_string()]).unwrap_err();
        assert_eq!(violations[0].field, "containment_measures[1]");
        assert_eq!(
            validate_measures(&[" a ".to_string(), "a".to_string()]).unwrap(),
            vec!["a".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn reassessment_rejects_negative_counts() {
        let changes = Reassessment {
            estimated_affected_individuals: Some(-1),
            ..Default::default()
        };
        assert!(validate_reassessment(&changes).is_err());
        assert_eq!(validate_reassessment(&Reassessment::default()), Ok(None));
    }
}
