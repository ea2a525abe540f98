//! Incident lifecycle orchestration.
//!
//! Each mutating call follows the same shape: load, validate and apply in memory, then exactly
//! one `save`. Any failure before the save leaves storage untouched; calls that change nothing
//! return the stored incident without writing.

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::DeadlinePolicy;
use crate::deadline::is_overdue;
use crate::domain::{
    Actor, Incident, IncidentDraft, IncidentId, IncidentStatus, NotificationPayload, Reassessment,
};
use crate::error::LifecycleError;
use crate::lifecycle::{apply_transition, escalate_for_late_notification};
use crate::notification::{payload_digest, refresh_requirement};
use crate::repo::IncidentRepository;
use crate::validate::{validate_actor, validate_draft, validate_measures, validate_reassessment};

pub struct IncidentService<R, C> {
    repo: R,
    clock: C,
    policy: DeadlinePolicy,
}

fn require_actor(actor: &Actor) -> Result<(), LifecycleError> {
    let mut violations = Vec::new();
    validate_actor(actor, &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(LifecycleError::Validation(violations))
    }
}

fn touch(incident: &mut Incident, actor: &Actor, now: OffsetDateTime) {
    incident.updated_by = actor.id.trim().to_string();
    incident.updated_at = now;
}

/// Post-closure mutations are reported as an attempt to leave `closed`.
fn ensure_not_closed(incident: &Incident) -> Result<(), LifecycleError> {
    if incident.status.is_terminal() {
        return Err(LifecycleError::IllegalTransition {
            from: incident.status,
            to: IncidentStatus::Investigating,
        });
    }
    Ok(())
}

impl<R: IncidentRepository, C: Clock> IncidentService<R, C> {
    pub fn new(repo: R, clock: C, policy: DeadlinePolicy) -> Self {
        Self {
            repo,
            clock,
            policy,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn policy(&self) -> &DeadlinePolicy {
        &self.policy
    }

    pub fn get(&self, id: &IncidentId) -> Result<Incident, LifecycleError> {
        self.repo.get(id)
    }

    /// Validate the draft, derive the notification obligation and persist as `open`.
    pub fn create(&self, actor: &Actor, draft: &IncidentDraft) -> Result<Incident, LifecycleError> {
        let now = self.clock.now();
        let valid = validate_draft(draft, actor, now).map_err(LifecycleError::Validation)?;
        let actor_id = actor.id.trim().to_string();

        let mut incident = Incident {
            id: IncidentId::generate(),
            title: valid.title,
            description: valid.description,
            incident_type: valid.incident_type,
            severity: valid.severity,
            affected_data_categories: valid.affected_data_categories,
            estimated_affected_individuals: valid.estimated_affected_individuals,
            discovered_at: valid.discovered_at,
            occurred_at: valid.occurred_at,
            status: IncidentStatus::Open,
            notification_required: false,
            notification_deadline: None,
            notified: false,
            notified_at: None,
            notification_reference: None,
            notification_digest: None,
            containment_measures: Vec::new(),
            closure_report: None,
            created_by: actor_id.clone(),
            updated_by: actor_id,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        refresh_requirement(&mut incident, &self.policy);

        let saved = self.repo.save(&incident)?;
        info!(
            incident_id = %saved.id,
            severity = saved.severity.as_str(),
            notification_required = saved.notification_required,
            actor = %saved.created_by,
            "incident created"
        );
        Ok(saved)
    }

    /// Append containment measures; the first containment on an open incident starts the
    /// investigation.
    pub fn contain(
        &self,
        id: &IncidentId,
        actor: &Actor,
        measures: &[String],
    ) -> Result<Incident, LifecycleError> {
        require_actor(actor)?;
        let measures = validate_measures(measures).map_err(LifecycleError::Validation)?;
        let mut incident = self.repo.get(id)?;
        ensure_not_closed(&incident)?;

        if incident.status == IncidentStatus::Open {
            apply_transition(&mut incident, IncidentStatus::Investigating)?;
        }
        let added = measures.len();
        incident.containment_measures.extend(measures);
        touch(&mut incident, actor, self.clock.now());

        let saved = self.repo.save(&incident)?;
        info!(
            incident_id = %saved.id,
            added,
            total = saved.containment_measures.len(),
            status = %saved.status,
            actor = %actor.id,
            "containment measures recorded"
        );
        Ok(saved)
    }

    pub fn begin_investigation(
        &self,
        id: &IncidentId,
        actor: &Actor,
    ) -> Result<Incident, LifecycleError> {
        self.transition(id, actor, IncidentStatus::Investigating)
    }

    pub fn escalate(&self, id: &IncidentId, actor: &Actor) -> Result<Incident, LifecycleError> {
        self.transition(id, actor, IncidentStatus::Escalated)
    }

    pub fn resolve(&self, id: &IncidentId, actor: &Actor) -> Result<Incident, LifecycleError> {
        self.transition(id, actor, IncidentStatus::Resolved)
    }

    fn transition(
        &self,
        id: &IncidentId,
        actor: &Actor,
        to: IncidentStatus,
    ) -> Result<Incident, LifecycleError> {
        require_actor(actor)?;
        let mut incident = self.repo.get(id)?;
        let from = incident.status;
        if !apply_transition(&mut incident, to)?.is_applied() {
            debug!(incident_id = %id, status = %to, "transition already satisfied");
            return Ok(incident);
        }
        touch(&mut incident, actor, self.clock.now());

        let saved = self.repo.save(&incident)?;
        info!(incident_id = %saved.id, from = %from, to = %to, actor = %actor.id, "status changed");
        Ok(saved)
    }

    /// Record that the regulatory notification was filed.
    ///
    /// A notification filed after the deadline escalates the incident. Repeating the call once
    /// notified changes nothing.
    pub fn notify(
        &self,
        id: &IncidentId,
        actor: &Actor,
        payload: &NotificationPayload,
    ) -> Result<Incident, LifecycleError> {
        require_actor(actor)?;
        let mut incident = self.repo.get(id)?;
        if !incident.notification_required {
            return Err(LifecycleError::NotRequired(id.clone()));
        }

        let digest = payload_digest(payload)?;
        if incident.notified {
            if incident.notification_digest.as_deref() != Some(digest.as_str()) {
                warn!(
                    incident_id = %id,
                    actor = %actor.id,
                    "repeat notification with a different payload ignored"
                );
            } else {
                debug!(incident_id = %id, "incident already notified");
            }
            return Ok(incident);
        }

        let now = self.clock.now();
        let late = incident
            .notification_deadline
            .is_some_and(|deadline| is_overdue(now, deadline, false));

        incident.notified = true;
        incident.notified_at = Some(now);
        incident.notification_reference = payload
            .authority_reference
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        incident.notification_digest = Some(digest);
        if late {
            escalate_for_late_notification(&mut incident)?;
        }
        touch(&mut incident, actor, now);

        let saved = self.repo.save(&incident)?;
        if late {
            warn!(
                incident_id = %saved.id,
                status = %saved.status,
                actor = %actor.id,
                "regulatory notification recorded after deadline"
            );
        } else {
            info!(incident_id = %saved.id, actor = %actor.id, "regulatory notification recorded");
        }
        Ok(saved)
    }

    /// Terminally close a resolved incident with its closure report.
    pub fn close(
        &self,
        id: &IncidentId,
        actor: &Actor,
        closure_report: &str,
    ) -> Result<Incident, LifecycleError> {
        require_actor(actor)?;
        let incident = self.repo.get(id)?;
        if incident.status == IncidentStatus::Closed {
            debug!(incident_id = %id, "incident already closed");
            return Ok(incident);
        }

        let mut candidate = incident;
        let report = closure_report.trim();
        candidate.closure_report = (!report.is_empty()).then(|| report.to_string());
        apply_transition(&mut candidate, IncidentStatus::Closed)?;
        touch(&mut candidate, actor, self.clock.now());

        let saved = self.repo.save(&candidate)?;
        info!(incident_id = %saved.id, actor = %actor.id, "incident closed");
        Ok(saved)
    }

    /// Update the fields that drive the notification rule.
    ///
    /// While un-notified the obligation and deadline are recomputed; after notification they stay
    /// frozen even if the new values would evaluate differently.
    pub fn reassess(
        &self,
        id: &IncidentId,
        actor: &Actor,
        changes: &Reassessment,
    ) -> Result<Incident, LifecycleError> {
        require_actor(actor)?;
        let affected = validate_reassessment(changes).map_err(LifecycleError::Validation)?;
        let original = self.repo.get(id)?;
        ensure_not_closed(&original)?;

        let mut incident = original.clone();
        if let Some(t) = changes.incident_type {
            incident.incident_type = t;
        }
        if let Some(s) = changes.severity {
            incident.severity = s;
        }
        if let Some(categories) = &changes.affected_data_categories {
            incident.affected_data_categories = categories.clone();
        }
        if let Some(n) = affected {
            incident.estimated_affected_individuals = n;
        }
        let requirement_changed = refresh_requirement(&mut incident, &self.policy);

        if incident == original {
            debug!(incident_id = %id, "reassessment changed nothing");
            return Ok(original);
        }
        touch(&mut incident, actor, self.clock.now());

        let saved = self.repo.save(&incident)?;
        info!(
            incident_id = %saved.id,
            severity = saved.severity.as_str(),
            notification_required = saved.notification_required,
            requirement_changed,
            frozen = saved.notified,
            actor = %actor.id,
            "incident reassessed"
        );
        Ok(saved)
    }
}
