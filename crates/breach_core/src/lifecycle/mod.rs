//! Incident status state machine.
//!
//! `open -> investigating -> escalated -> resolved -> closed`, with `investigating -> resolved`
//! as the only shortcut. Every guard runs before anything is written, so a rejected transition
//! leaves the incident untouched.

use crate::domain::{Incident, IncidentStatus};
use crate::error::{ClosureBlockReason, LifecycleError};

/// Result of a transition that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Target equals the current status; nothing to write.
    Unchanged,
    Applied {
        from: IncidentStatus,
        to: IncidentStatus,
    },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

/// Edge table, ignoring guards.
pub fn is_edge_allowed(from: IncidentStatus, to: IncidentStatus) -> bool {
    use IncidentStatus::*;
    matches!(
        (from, to),
        (Open, Investigating)
            | (Investigating, Escalated)
            | (Investigating, Resolved)
            | (Escalated, Resolved)
            | (Resolved, Closed)
    )
}

/// Closure rule: a non-empty report and no mandatory notification still pending.
pub fn check_closable(incident: &Incident) -> Result<(), LifecycleError> {
    if !incident.has_closure_report() {
        return Err(LifecycleError::ClosureBlocked {
            reason: ClosureBlockReason::MissingReport,
        });
    }
    if incident.notification_pending() {
        return Err(LifecycleError::ClosureBlocked {
            reason: ClosureBlockReason::PendingNotification,
        });
    }
    Ok(())
}

/// Validate `incident.status -> to` without mutating anything.
pub fn check_transition(
    incident: &Incident,
    to: IncidentStatus,
) -> Result<Transition, LifecycleError> {
    let from = incident.status;
    if from == to {
        return Ok(Transition::Unchanged);
    }
    if !is_edge_allowed(from, to) {
        return Err(LifecycleError::IllegalTransition { from, to });
    }
    match to {
        IncidentStatus::Resolved if incident.containment_measures.is_empty() => {
            Err(LifecycleError::ResolutionBlocked)
        }
        IncidentStatus::Closed => {
            check_closable(incident)?;
            Ok(Transition::Applied { from, to })
        }
        _ => Ok(Transition::Applied { from, to }),
    }
}

/// Check-then-apply. The status is written only when every guard passed.
pub fn apply_transition(
    incident: &mut Incident,
    to: IncidentStatus,
) -> Result<Transition, LifecycleError> {
    let transition = check_transition(incident, to)?;
    if let Transition::Applied { to, .. } = transition {
        incident.status = to;
    }
    Ok(transition)
}

/// Status change triggered by a notification filed after its deadline.
///
/// Walks forward to `escalated` when that state is still ahead of the incident; incidents that
/// are already escalated, resolved or closed keep their status.
pub fn escalate_for_late_notification(incident: &mut Incident) -> Result<bool, LifecycleError> {
    match incident.status {
        IncidentStatus::Open => {
            apply_transition(incident, IncidentStatus::Investigating)?;
            apply_transition(incident, IncidentStatus::Escalated)?;
            Ok(true)
        }
        IncidentStatus::Investigating => {
            apply_transition(incident, IncidentStatus::Escalated)?;
            Ok(true)
        }
        IncidentStatus::Escalated | IncidentStatus::Resolved | IncidentStatus::Closed => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IncidentId, IncidentType, Severity};
    use std::collections::BTreeSet;
    use time::macros::datetime;

    fn incident(status: IncidentStatus) -> Incident {
        let t0 = datetime!(2026-03-01 09:00 UTC);
        Incident {
            id: IncidentId::from("inc-1"),
            title: "Laptop stolen".to_string(),
            description: "Unencrypted laptop stolen from car".to_string(),
            incident_type: IncidentType::PhysicalTheft,
            severity: Severity::Medium,
            affected_data_categories: BTreeSet::new(),
            estimated_affected_individuals: 10,
            discovered_at: t0,
            occurred_at: None,
            status,
            notification_required: false,
            notification_deadline: None,
            notified: false,
            notified_at: None,
            notification_reference: None,
            notification_digest: None,
            containment_measures: Vec::new(),
            closure_report: None,
            created_by: "dpo".to_string(),
            updated_by: "dpo".to_string(),
            created_at: t0,
            updated_at: t0,
            version: 1,
        }
    }

    #[test]
    fn edge_table_matches_lifecycle() {
        use IncidentStatus::*;
        let allowed = [
            (Open, Investigating),
            (Investigating, Escalated),
            (Investigating, Resolved),
            (Escalated, Resolved),
            (Resolved, Closed),
        ];
        for from in IncidentStatus::ALL {
            for to in IncidentStatus::ALL {
                assert_eq!(
                    is_edge_allowed(from, to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn same_state_is_a_noop_for_every_status() {
        for status in IncidentStatus::ALL {
            let mut inc = incident(status);
            let before = inc.clone();
            assert_eq!(apply_transition(&mut inc, status), Ok(Transition::Unchanged));
            assert_eq!(inc, before);
        }
    }

    #[test]
    fn skipping_to_closed_is_illegal() {
        for from in [
            IncidentStatus::Open,
            IncidentStatus::Investigating,
            IncidentStatus::Escalated,
        ] {
            let mut inc = incident(from);
            inc.closure_report = Some("done".to_string());
            let err = apply_transition(&mut inc, IncidentStatus::Closed).unwrap_err();
            assert_eq!(
                err,
                LifecycleError::IllegalTransition {
                    from,
                    to: IncidentStatus::Closed
                }
            );
            assert_eq!(inc.status, from);
        }
    }

    #[test]
    fn backward_transitions_are_rejected() {
        let mut inc = incident(IncidentStatus::Escalated);
        let err = apply_transition(&mut inc, IncidentStatus::Investigating).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::IllegalTransition {
                from: IncidentStatus::Escalated,
                to: IncidentStatus::Investigating
            }
        );

        let mut inc = incident(IncidentStatus::Resolved);
        assert!(apply_transition(&mut inc, IncidentStatus::Open).is_err());
        assert_eq!(inc.status, IncidentStatus::Resolved);
    }

    #[test]
    fn resolve_requires_containment() {
        let mut inc = incident(IncidentStatus::Investigating);
        assert_eq!(
            apply_transition(&mut inc, IncidentStatus::Resolved),
            Err(LifecycleError::ResolutionBlocked)
        );
        assert_eq!(inc.status, IncidentStatus::Investigating);

        inc.containment_measures.push("Revoked VPN credentials".to_string());
        assert!(apply_transition(&mut inc, IncidentStatus::Resolved)
            .unwrap()
            .is_applied());
        assert_eq!(inc.status, IncidentStatus::Resolved);
    }

    #[test]
    fn close_checks_report_before_notification() {
        let mut inc = incident(IncidentStatus::Resolved);
        inc.notification_required = true;
        inc.notification_deadline = Some(datetime!(2026-03-04 09:00 UTC));

        assert_eq!(
            apply_transition(&mut inc, IncidentStatus::Closed),
            Err(LifecycleError::ClosureBlocked {
                reason: ClosureBlockReason::MissingReport
            })
        );

        inc.closure_report = Some("   ".to_string());
        assert_eq!(
            check_transition(&inc, IncidentStatus::Closed),
            Err(LifecycleError::ClosureBlocked {
                reason: ClosureBlockReason::MissingReport
            })
        );

        inc.closure_report = Some("Root cause: stolen device".to_string());
        assert_eq!(
            check_transition(&inc, IncidentStatus::Closed),
            Err(LifecycleError::ClosureBlocked {
                reason: ClosureBlockReason::PendingNotification
            })
        );

        inc.notified = true;
        inc.notified_at = Some(datetime!(2026-03-02 09:00 UTC));
        assert!(apply_transition(&mut inc, IncidentStatus::Closed).is_ok());
        assert_eq!(inc.status, IncidentStatus::Closed);
    }

    #[test]
    fn late_notification_escalation_walks_forward_only() {
        let mut open = incident(IncidentStatus::Open);
        assert_eq!(escalate_for_late_notification(&mut open), Ok(true));
        assert_eq!(open.status, IncidentStatus::Escalated);

        let mut investigating = incident(IncidentStatus::Investigating);
        assert_eq!(escalate_for_late_notification(&mut investigating), Ok(true));
        assert_eq!(investigating.status, IncidentStatus::Escalated);

        for status in [
            IncidentStatus::Escalated,
            IncidentStatus::Resolved,
            IncidentStatus::Closed,
        ] {
            let mut inc = incident(status);
            assert_eq!(escalate_for_late_notification(&mut inc), Ok(false));
            assert_eq!(inc.status, status);
        }
    }
}
