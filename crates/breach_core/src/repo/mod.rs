pub mod memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};

use crate::domain::{Incident, IncidentId, IncidentStatus};
use crate::error::LifecycleError;

pub use memory::InMemoryIncidentRepository;
pub use sqlite::SqliteIncidentRepository;

/// Query filter; `None` means "don't care".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentFilter {
    pub statuses: Option<Vec<IncidentStatus>>,
    pub notification_required: Option<bool>,
    pub notified: Option<bool>,
}

impl IncidentFilter {
    /// Incidents that still owe the regulator a notification and are not wound down.
    pub fn awaiting_notification() -> Self {
        Self {
            statuses: Some(vec![
                IncidentStatus::Open,
                IncidentStatus::Investigating,
                IncidentStatus::Escalated,
            ]),
            notification_required: Some(true),
            notified: Some(false),
        }
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        self.statuses
            .as_ref()
            .map_or(true, |s| s.contains(&incident.status))
            && self
                .notification_required
                .map_or(true, |r| r == incident.notification_required)
            && self.notified.map_or(true, |n| n == incident.notified)
    }
}

/// Persistence port for incidents.
///
/// `save` is an optimistic write: `version == 0` inserts, anything else updates only when the
/// stored version still equals `incident.version`. A lost update yields
/// `LifecycleError::Conflict`. The returned incident carries the new version.
pub trait IncidentRepository {
    fn get(&self, id: &IncidentId) -> Result<Incident, LifecycleError>;
    fn save(&self, incident: &Incident) -> Result<Incident, LifecycleError>;
    fn query(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, LifecycleError>;
}

impl<R: IncidentRepository + ?Sized> IncidentRepository for &R {
    fn get(&self, id: &IncidentId) -> Result<Incident, LifecycleError> {
        (**self).get(id)
    }

    fn save(&self, incident: &Incident) -> Result<Incident, LifecycleError> {
        (**self).save(incident)
    }

    fn query(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, LifecycleError> {
        (**self).query(filter)
    }
}

impl<R: IncidentRepository + ?Sized> IncidentRepository for std::sync::Arc<R> {
    fn get(&self, id: &IncidentId) -> Result<Incident, LifecycleError> {
        (**self).get(id)
    }

    fn save(&self, incident: &Incident) -> Result<Incident, LifecycleError> {
        (**self).save(incident)
    }

    fn query(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, LifecycleError> {
        (**self).query(filter)
    }
}
