//! In-process repository backed by a mutex-guarded map.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{IncidentFilter, IncidentRepository};
use crate::domain::{Incident, IncidentId};
use crate::error::LifecycleError;

/// Map-backed repository with the same optimistic-locking contract as the SQLite store.
///
/// Intended for tests and for hosts that keep incidents in memory.
#[derive(Debug, Default)]
pub struct InMemoryIncidentRepository {
    incidents: Mutex<BTreeMap<IncidentId, Incident>>,
    saves: AtomicUsize,
}

impl InMemoryIncidentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.incidents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IncidentRepository for InMemoryIncidentRepository {
    fn get(&self, id: &IncidentId) -> Result<Incident, LifecycleError> {
        let map = self.incidents.lock().unwrap_or_else(|e| e.into_inner());
        map.get(id)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    fn save(&self, incident: &Incident) -> Result<Incident, LifecycleError> {
        let mut map = self.incidents.lock().unwrap_or_else(|e| e.into_inner());
        match map.get(&incident.id) {
            None if incident.version != 0 => {
                return Err(LifecycleError::NotFound(incident.id.clone()))
            }
            Some(_) if incident.version == 0 => {
                return Err(LifecycleError::Conflict(incident.id.clone()))
            }
            Some(stored) if stored.version != incident.version => {
                return Err(LifecycleError::Conflict(incident.id.clone()))
            }
            _ => {}
        }

        let mut stored = incident.clone();
        stored.version = incident.version + 1;
        map.insert(stored.id.clone(), stored.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    fn query(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, LifecycleError> {
        let map = self.incidents.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map.values().filter(|i| filter.matches(i)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IncidentStatus, IncidentType, Severity};
    use std::collections::BTreeSet;
    use time::macros::datetime;

    fn incident(id: &str) -> Incident {
        let t0 = datetime!(2026-03-01 09:00 UTC);
        Incident {
            id: IncidentId::from(id),
            title: "Misdirected email".to_string(),
            description: "Payroll file sent to wrong recipient".to_string(),
            incident_type: IncidentType::HumanError,
            severity: Severity::Low,
            affected_data_categories: BTreeSet::new(),
            estimated_affected_individuals: 3,
            discovered_at: t0,
            occurred_at: None,
            status: IncidentStatus::Open,
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
            version: 0,
        }
    }

    #[test]
    fn insert_then_update_bumps_version() {
        let repo = InMemoryIncidentRepository::new();
        let saved = repo.save(&incident("a")).unwrap();
        assert_eq!(saved.version, 1);

        let mut changed = saved.clone();
        changed.title = "Misdirected payroll email".to_string();
        let saved2 = repo.save(&changed).unwrap();
        assert_eq!(saved2.version, 2);
        assert_eq!(repo.get(&IncidentId::from("a")).unwrap(), saved2);
        assert_eq!(repo.save_count(), 2);
    }

    #[test]
    fn stale_write_is_a_conflict() {
        let repo = InMemoryIncidentRepository::new();
        let saved = repo.save(&incident("a")).unwrap();
        repo.save(&saved).unwrap();

        let err = repo.save(&saved).unwrap_err();
        assert_eq!(err, LifecycleError::Conflict(IncidentId::from("a")));
        assert_eq!(repo.save_count(), 2);
    }

    #[test]
    fn duplicate_insert_is_a_conflict_and_unknown_update_is_not_found() {
        let repo = InMemoryIncidentRepository::new();
        repo.save(&incident("a")).unwrap();
        assert!(matches!(
            repo.save(&incident("a")),
            Err(LifecycleError::Conflict(_))
        ));

        let mut ghost = incident("ghost");
        ghost.version = 4;
        assert!(matches!(repo.save(&ghost), Err(LifecycleError::NotFound(_))));
    }
}
