use std::collections::BTreeSet;

use rusqlite::types::Value;
use rusqlite::{named_params, Connection, OptionalExtension};

use super::{IncidentFilter, IncidentRepository};
use crate::domain::{DataCategory, Incident, IncidentId, IncidentStatus, IncidentType, Severity};
use crate::error::{AppError, LifecycleError};
use crate::timestamps::{opt_to_rfc3339_utc, parse_opt_rfc3339, parse_rfc3339, to_rfc3339_utc};

const SELECT_COLUMNS: &str = r#"
  id, title, description, incident_type, severity,
  affected_data_categories_json, estimated_affected_individuals,
  discovered_at, occurred_at, status,
  notification_required, notification_deadline, notified, notified_at,
  notification_reference, notification_digest,
  containment_measures_json, closure_report,
  created_by, updated_by, created_at, updated_at, version
"#;

/// `IncidentRepository` over a borrowed SQLite connection (see `crate::db` for open/migrate).
pub struct SqliteIncidentRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteIncidentRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn count(&self) -> Result<i64, AppError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to count incidents")
                    .with_details(e.to_string())
            })
    }

    fn exists(&self, id: &IncidentId) -> Result<bool, AppError> {
        self.conn
            .query_row(
                "SELECT 1 FROM incidents WHERE id = ?1",
                [id.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map(|r| r.is_some())
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to check incident existence")
                    .with_details(e.to_string())
            })
    }
}

/// Raw column values; decoding happens outside the rusqlite row closure so failures carry
/// structured `AppError` details.
struct IncidentRow {
    id: String,
    title: String,
    description: String,
    incident_type: String,
    severity: String,
    affected_data_categories_json: String,
    estimated_affected_individuals: i64,
    discovered_at: String,
    occurred_at: Option<String>,
    status: String,
    notification_required: bool,
    notification_deadline: Option<String>,
    notified: bool,
    notified_at: Option<String>,
    notification_reference: Option<String>,
    notification_digest: Option<String>,
    containment_measures_json: String,
    closure_report: Option<String>,
    created_by: String,
    updated_by: String,
    created_at: String,
    updated_at: String,
    version: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncidentRow> {
    Ok(IncidentRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        incident_type: row.get(3)?,
        severity: row.get(4)?,
        affected_data_categories_json: row.get(5)?,
        estimated_affected_individuals: row.get(6)?,
        discovered_at: row.get(7)?,
        occurred_at: row.get(8)?,
        status: row.get(9)?,
        notification_required: row.get(10)?,
        notification_deadline: row.get(11)?,
        notified: row.get(12)?,
        notified_at: row.get(13)?,
        notification_reference: row.get(14)?,
        notification_digest: row.get(15)?,
        containment_measures_json: row.get(16)?,
        closure_report: row.get(17)?,
        created_by: row.get(18)?,
        updated_by: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
        version: row.get(22)?,
    })
}

fn decode_enum<T>(field: &str, raw: &str, parse: fn(&str) -> Option<T>) -> Result<T, AppError> {
    parse(raw).ok_or_else(|| {
        AppError::new("DB_DECODE_FAILED", format!("Unknown {field} value"))
            .with_details(format!("value={raw}"))
    })
}

impl IncidentRow {
    fn decode(self) -> Result<Incident, AppError> {
        let affected_data_categories: BTreeSet<DataCategory> =
            serde_json::from_str(&self.affected_data_categories_json).map_err(|e| {
                AppError::new("DB_DECODE_FAILED", "Failed to decode affected data categories")
                    .with_details(format!("id={}; err={}", self.id, e))
            })?;
        let containment_measures: Vec<String> =
            serde_json::from_str(&self.containment_measures_json).map_err(|e| {
                AppError::new("DB_DECODE_FAILED", "Failed to decode containment measures")
                    .with_details(format!("id={}; err={}", self.id, e))
            })?;
        let estimated_affected_individuals = u64::try_from(self.estimated_affected_individuals)
            .map_err(|_| {
                AppError::new("DB_DECODE_FAILED", "Negative affected-individual count")
                    .with_details(format!(
                        "id={}; value={}",
                        self.id, self.estimated_affected_individuals
                    ))
            })?;

        Ok(Incident {
            incident_type: decode_enum(
                "incident_type",
                &self.incident_type,
                IncidentType::from_str,
            )?,
            severity: decode_enum("severity", &self.severity, Severity::from_str)?,
            status: decode_enum("status", &self.status, IncidentStatus::from_str)?,
            discovered_at: parse_rfc3339("discovered_at", &self.discovered_at)?,
            occurred_at: parse_opt_rfc3339("occurred_at", self.occurred_at.as_deref())?,
            notification_deadline: parse_opt_rfc3339(
                "notification_deadline",
                self.notification_deadline.as_deref(),
            )?,
            notified_at: parse_opt_rfc3339("notified_at", self.notified_at.as_deref())?,
            created_at: parse_rfc3339("created_at", &self.created_at)?,
            updated_at: parse_rfc3339("updated_at", &self.updated_at)?,
            id: IncidentId::from(self.id),
            title: self.title,
            description: self.description,
            affected_data_categories,
            estimated_affected_individuals,
            notification_required: self.notification_required,
            notified: self.notified,
            notification_reference: self.notification_reference,
            notification_digest: self.notification_digest,
            containment_measures,
            closure_report: self.closure_report,
            created_by: self.created_by,
            updated_by: self.updated_by,
            version: self.version,
        })
    }
}

struct EncodedIncident {
    categories_json: String,
    measures_json: String,
    affected: i64,
    discovered_at: String,
    occurred_at: Option<String>,
    notification_deadline: Option<String>,
    notified_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn encode(incident: &Incident) -> Result<EncodedIncident, AppError> {
    let categories_json = serde_json::to_string(&incident.affected_data_categories).map_err(|e| {
        AppError::new("DB_ENCODE_FAILED", "Failed to encode affected data categories")
            .with_details(e.to_string())
    })?;
    let measures_json = serde_json::to_string(&incident.containment_measures).map_err(|e| {
        AppError::new("DB_ENCODE_FAILED", "Failed to encode containment measures")
            .with_details(e.to_string())
    })?;
    let affected = i64::try_from(incident.estimated_affected_individuals).map_err(|_| {
        AppError::new("DB_ENCODE_FAILED", "Affected-individual count exceeds storage range")
            .with_details(format!("value={}", incident.estimated_affected_individuals))
    })?;
    Ok(EncodedIncident {
        categories_json,
        measures_json,
        affected,
        discovered_at: to_rfc3339_utc(incident.discovered_at)?,
        occurred_at: opt_to_rfc3339_utc(incident.occurred_at)?,
        notification_deadline: opt_to_rfc3339_utc(incident.notification_deadline)?,
        notified_at: opt_to_rfc3339_utc(incident.notified_at)?,
        created_at: to_rfc3339_utc(incident.created_at)?,
        updated_at: to_rfc3339_utc(incident.updated_at)?,
    })
}

fn is_primary_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

impl IncidentRepository for SqliteIncidentRepository<'_> {
    fn get(&self, id: &IncidentId) -> Result<Incident, LifecycleError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM incidents WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, [id.as_str()], read_row)
            .optional()
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to query incident")
                    .with_details(e.to_string())
            })?;
        match row {
            Some(row) => Ok(row.decode()?),
            None => Err(LifecycleError::NotFound(id.clone())),
        }
    }

    fn save(&self, incident: &Incident) -> Result<Incident, LifecycleError> {
        let enc = encode(incident)?;
        let next_version = incident.version + 1;

        if incident.version == 0 {
            let inserted = self.conn.execute(
                r#"
          INSERT INTO incidents (
            id, title, description, incident_type, severity,
            affected_data_categories_json, estimated_affected_individuals,
            discovered_at, occurred_at, status,
            notification_required, notification_deadline, notified, notified_at,
            notification_reference, notification_digest,
            containment_measures_json, closure_report,
            created_by, updated_by, created_at, updated_at, version
          ) VALUES (
            :id, :title, :description, :incident_type, :severity,
            :categories, :affected,
            :discovered_at, :occurred_at, :status,
            :notification_required, :notification_deadline, :notified, :notified_at,
            :notification_reference, :notification_digest,
            :measures, :closure_report,
            :created_by, :updated_by, :created_at, :updated_at, :version
          )
          "#,
                named_params! {
                    ":id": incident.id.as_str(),
                    ":title": incident.title,
                    ":description": incident.description,
                    ":incident_type": incident.incident_type.as_str(),
                    ":severity": incident.severity.as_str(),
                    ":categories": enc.categories_json,
                    ":affected": enc.affected,
                    ":discovered_at": enc.discovered_at,
                    ":occurred_at": enc.occurred_at,
                    ":status": incident.status.as_str(),
                    ":notification_required": incident.notification_required,
                    ":notification_deadline": enc.notification_deadline,
                    ":notified": incident.notified,
                    ":notified_at": enc.notified_at,
                    ":notification_reference": incident.notification_reference,
                    ":notification_digest": incident.notification_digest,
                    ":measures": enc.measures_json,
                    ":closure_report": incident.closure_report,
                    ":created_by": incident.created_by,
                    ":updated_by": incident.updated_by,
                    ":created_at": enc.created_at,
                    ":updated_at": enc.updated_at,
                    ":version": next_version,
                },
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_primary_key_violation(&e) => {
                    return Err(LifecycleError::Conflict(incident.id.clone()))
                }
                Err(e) => {
                    return Err(AppError::new("DB_WRITE_FAILED", "Failed to insert incident")
                        .with_details(e.to_string())
                        .into())
                }
            }
        } else {
            let changed = self
                .conn
                .execute(
                    r#"
          UPDATE incidents SET
            title = :title,
            description = :description,
            incident_type = :incident_type,
            severity = :severity,
            affected_data_categories_json = :categories,
            estimated_affected_individuals = :affected,
            discovered_at = :discovered_at,
            occurred_at = :occurred_at,
            status = :status,
            notification_required = :notification_required,
            notification_deadline = :notification_deadline,
            notified = :notified,
            notified_at = :notified_at,
            notification_reference = :notification_reference,
            notification_digest = :notification_digest,
            containment_measures_json = :measures,
            closure_report = :closure_report,
            updated_by = :updated_by,
            updated_at = :updated_at,
            version = :version
          WHERE id = :id AND version = :expected_version
          "#,
                    named_params! {
                        ":id": incident.id.as_str(),
                        ":title": incident.title,
                        ":description": incident.description,
                        ":incident_type": incident.incident_type.as_str(),
                        ":severity": incident.severity.as_str(),
                        ":categories": enc.categories_json,
                        ":affected": enc.affected,
                        ":discovered_at": enc.discovered_at,
                        ":occurred_at": enc.occurred_at,
                        ":status": incident.status.as_str(),
                        ":notification_required": incident.notification_required,
                        ":notification_deadline": enc.notification_deadline,
                        ":notified": incident.notified,
                        ":notified_at": enc.notified_at,
                        ":notification_reference": incident.notification_reference,
                        ":notification_digest": incident.notification_digest,
                        ":measures": enc.measures_json,
                        ":closure_report": incident.closure_report,
                        ":updated_by": incident.updated_by,
                        ":updated_at": enc.updated_at,
                        ":version": next_version,
                        ":expected_version": incident.version,
                    },
                )
                .map_err(|e| {
                    AppError::new("DB_WRITE_FAILED", "Failed to update incident")
                        .with_details(e.to_string())
                })?;

            if changed == 0 {
                return if self.exists(&incident.id)? {
                    Err(LifecycleError::Conflict(incident.id.clone()))
                } else {
                    Err(LifecycleError::NotFound(incident.id.clone()))
                };
            }
        }

        let mut stored = incident.clone();
        stored.version = next_version;
        Ok(stored)
    }

    fn query(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, LifecycleError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(statuses) = &filter.statuses {
            if statuses.is_empty() {
                return Ok(Vec::new());
            }
            let mut placeholders = Vec::with_capacity(statuses.len());
            for status in statuses {
                values.push(Value::Text(status.as_str().to_string()));
                placeholders.push(format!("?{}", values.len()));
            }
            clauses.push(format!("status IN ({})", placeholders.join(", ")));
        }
        if let Some(required) = filter.notification_required {
            values.push(Value::Integer(i64::from(required)));
            clauses.push(format!("notification_required = ?{}", values.len()));
        }
        if let Some(notified) = filter.notified {
            values.push(Value::Integer(i64::from(notified)));
            clauses.push(format!("notified = ?{}", values.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM incidents {where_sql} \
             ORDER BY discovered_at ASC, id ASC"
        );

        let mut stmt = self.conn.prepare(&sql).map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare incidents query")
                .with_details(e.to_string())
        })?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), read_row)
            .map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to query incidents")
                    .with_details(e.to_string())
            })?;

        let mut out = Vec::new();
        for r in rows {
            let row = r.map_err(|e| {
                AppError::new("DB_QUERY_FAILED", "Failed to decode incident row")
                    .with_details(e.to_string())
            })?;
            out.push(row.decode()?);
        }
        Ok(out)
    }
}
