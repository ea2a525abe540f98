//! Privacy incident lifecycle engine: notification-requirement rules, the regulatory deadline,
//! status transitions and overdue detection, over a pluggable incident repository.

pub mod clock;
pub mod config;
pub mod db;
pub mod deadline;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod notification;
pub mod repo;
pub mod scanner;
pub mod service;
pub mod timestamps;
pub mod validate;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::DeadlinePolicy;
pub use domain::{
    Actor, DataCategory, Incident, IncidentDraft, IncidentId, IncidentStatus, IncidentType,
    NotificationPayload, Reassessment, Severity,
};
pub use error::{AppError, ClosureBlockReason, LifecycleError};
pub use repo::{
    IncidentFilter, IncidentRepository, InMemoryIncidentRepository, SqliteIncidentRepository,
};
pub use scanner::OverdueScanner;
pub use service::IncidentService;
