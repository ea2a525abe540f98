use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::domain::Incident;

/// `discovered_at + window`, in UTC.
pub fn compute_deadline(discovered_at: OffsetDateTime, window: Duration) -> OffsetDateTime {
    discovered_at.to_offset(UtcOffset::UTC) + window
}

/// Strictly after the deadline; `now == deadline` is still on time.
pub fn is_overdue(now: OffsetDateTime, deadline: OffsetDateTime, notified: bool) -> bool {
    !notified && now > deadline
}

/// Countdown view of an incident's notification obligation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeadlineStatus {
    NotRequired,
    Notified { late: bool },
    Pending { remaining_seconds: i64 },
    Overdue { overdue_by_seconds: i64 },
}

pub fn deadline_status(now: OffsetDateTime, incident: &Incident) -> DeadlineStatus {
    if incident.notified {
        return DeadlineStatus::Notified {
            late: incident.notified_late(),
        };
    }
    match (incident.notification_required, incident.notification_deadline) {
        (true, Some(deadline)) if is_overdue(now, deadline, false) => DeadlineStatus::Overdue {
            overdue_by_seconds: (now - deadline).whole_seconds(),
        },
        (true, Some(deadline)) => DeadlineStatus::Pending {
            remaining_seconds: (deadline - now).whole_seconds(),
        },
        _ => DeadlineStatus::NotRequired,
    }
}
