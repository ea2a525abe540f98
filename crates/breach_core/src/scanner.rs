use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::deadline::is_overdue;
use crate::domain::Incident;
use crate::error::LifecycleError;
use crate::repo::{IncidentFilter, IncidentRepository};

/// Read-only sweep for incidents whose notification deadline has passed.
///
/// Overdue incidents are reported, never modified; escalation stays a human decision. The host
/// owns scheduling and may call `scan` as often and as concurrently as it likes.
pub struct OverdueScanner<R> {
    repo: R,
}

impl<R: IncidentRepository> OverdueScanner<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Overdue incidents at `now`, oldest deadline first.
    pub fn scan(&self, now: OffsetDateTime) -> Result<Vec<Incident>, LifecycleError> {
        let candidates = self.repo.query(&IncidentFilter::awaiting_notification())?;
        let candidate_count = candidates.len();

        let mut overdue: Vec<Incident> = candidates
            .into_iter()
            .filter(|i| {
                i.notification_deadline
                    .is_some_and(|deadline| is_overdue(now, deadline, i.notified))
            })
            .collect();
        overdue.sort_by(|a, b| {
            (a.notification_deadline, &a.id).cmp(&(b.notification_deadline, &b.id))
        });

        for incident in &overdue {
            warn!(
                incident_id = %incident.id,
                status = %incident.status,
                deadline = ?incident.notification_deadline,
                "regulatory notification overdue"
            );
        }
        debug!(
            candidates = candidate_count,
            overdue = overdue.len(),
            "overdue scan complete"
        );
        Ok(overdue)
    }

    pub fn scan_with<C: Clock>(&self, clock: &C) -> Result<Vec<Incident>, LifecycleError> {
        self.scan(clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::domain::{IncidentId, IncidentStatus, IncidentType, Severity};
    use crate::repo::InMemoryIncidentRepository;
    use std::collections::BTreeSet;
    use time::macros::datetime;
    use time::Duration;

    const T0: OffsetDateTime = datetime!(2026-03-01 09:00 UTC);

    fn required(id: &str, discovered_at: OffsetDateTime, status: IncidentStatus) -> Incident {
        Incident {
            id: IncidentId::from(id),
            title: "Credential stuffing".to_string(),
            description: "Customer accounts accessed".to_string(),
            incident_type: IncidentType::UnauthorizedAccess,
            severity: Severity::High,
            affected_data_categories: BTreeSet::new(),
            estimated_affected_individuals: 40,
            discovered_at,
            occurred_at: None,
            status,
            notification_required: true,
            notification_deadline: Some(discovered_at + Duration::hours(72)),
            notified: false,
            notified_at: None,
            notification_reference: None,
            notification_digest: None,
            containment_measures: vec!["Forced password reset".to_string()],
            closure_report: None,
            created_by: "dpo".to_string(),
            updated_by: "dpo".to_string(),
            created_at: discovered_at,
            updated_at: discovered_at,
            version: 0,
        }
    }

    #[test]
    fn skips_resolved_and_orders_by_deadline() {
        let repo = InMemoryIncidentRepository::new();
        repo.save(&required("b", T0, IncidentStatus::Escalated)).unwrap();
        repo.save(&required("a", T0 - Duration::hours(5), IncidentStatus::Open))
            .unwrap();
        repo.save(&required("c", T0 - Duration::hours(10), IncidentStatus::Resolved))
            .unwrap();

        let scanner = OverdueScanner::new(&repo);
        let ids: Vec<String> = scanner
            .scan(T0 + Duration::hours(100))
            .unwrap()
            .into_iter()
            .map(|i| i.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn scan_with_reads_the_clock() {
        let repo = InMemoryIncidentRepository::new();
        repo.save(&required("a", T0, IncidentStatus::Open)).unwrap();
        let scanner = OverdueScanner::new(&repo);
        let clock = FixedClock::new(T0 + Duration::hours(72));

        assert!(scanner.scan_with(&clock).unwrap().is_empty());
        clock.advance(Duration::seconds(1));
        let overdue = scanner.scan_with(&clock).unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, IncidentId::from("a"));
    }

    #[test]
    fn scanning_never_writes() {
        let repo = InMemoryIncidentRepository::new();
        repo.save(&required("a", T0, IncidentStatus::Investigating))
            .unwrap();
        let scanner = OverdueScanner::new(&repo);

        let first = scanner.scan(T0 + Duration::hours(73)).unwrap();
        let second = scanner.scan(T0 + Duration::hours(73)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].status, IncidentStatus::Investigating);
        assert_eq!(repo.save_count(), 1);
    }
}
