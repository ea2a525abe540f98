use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;

/// Schema history, oldest first. Names are recorded in `_migrations` once applied.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_init.sql",
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../migrations/0001_init.sql"
        )),
    ),
    (
        "0002_add_notification_audit_columns.sql",
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../migrations/0002_add_notification_audit_columns.sql"
        )),
    ),
];

const MIGRATIONS_TABLE_SQL: &str = r#"
  PRAGMA foreign_keys = ON;
  CREATE TABLE IF NOT EXISTS _migrations (
    name TEXT PRIMARY KEY NOT NULL,
    applied_at TEXT NOT NULL
  );
"#;

const RECORD_MIGRATION_SQL: &str =
    "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))";

pub fn open(path: &Path) -> Result<Connection, AppError> {
    Connection::open(path)
        .map_err(|e| AppError::storage("DB_OPEN_FAILED", "Failed to open incident store", e))
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(|e| {
        AppError::storage("DB_OPEN_FAILED", "Failed to open in-memory incident store", e)
    })
}

/// Open (creating if needed) an incident store file and bring its schema up to date.
pub fn open_store(path: &Path) -> Result<Connection, AppError> {
    if path.as_os_str().is_empty() {
        return Err(AppError::new("DB_INVALID_PATH", "Database path is empty"));
    }
    if path.is_dir() {
        return Err(AppError::new(
            "DB_INVALID_PATH",
            "Database path must be a file (not a directory)",
        )
        .with_details(path.display().to_string()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new("DB_OPEN_FAILED", "Failed to create database directory")
                .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }

    let mut conn = open(path)?;
    let applied = migrate(&mut conn)?;
    tracing::debug!(path = %path.display(), applied, "incident store ready");
    Ok(conn)
}

fn applied_migrations(conn: &Connection) -> Result<HashSet<String>, AppError> {
    let query_err = |e: rusqlite::Error| {
        AppError::storage("DB_MIGRATIONS_QUERY_FAILED", "Failed to read schema history", e)
    };

    let mut stmt = conn
        .prepare("SELECT name FROM _migrations")
        .map_err(query_err)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(query_err)?
        .collect::<Result<HashSet<_>, _>>()
        .map_err(query_err)?;
    Ok(names)
}

/// Runs one migration and records it inside the same transaction, so a failed script leaves
/// no history row behind.
fn apply_migration(conn: &mut Connection, name: &str, sql: &str) -> Result<(), AppError> {
    let tx = conn
        .transaction()
        .map_err(|e| AppError::storage("DB_TX_FAILED", "Failed to start migration", e))?;
    tx.execute_batch(sql).map_err(|e| {
        AppError::storage("DB_MIGRATION_FAILED", format!("Migration {name} failed"), e)
    })?;
    tx.execute(RECORD_MIGRATION_SQL, [name]).map_err(|e| {
        AppError::storage(
            "DB_MIGRATION_FAILED",
            format!("Failed to record migration {name}"),
            e,
        )
    })?;
    tx.commit()
        .map_err(|e| AppError::storage("DB_TX_FAILED", "Failed to commit migration", e))?;

    tracing::info!(migration = name, "applied schema migration");
    Ok(())
}

/// Bring the incident schema up to date. Returns how many migrations were applied by this call.
pub fn migrate(conn: &mut Connection) -> Result<usize, AppError> {
    conn.execute_batch(MIGRATIONS_TABLE_SQL).map_err(|e| {
        AppError::storage(
            "DB_MIGRATIONS_TABLE_FAILED",
            "Failed to ensure schema history table",
            e,
        )
    })?;

    let applied = applied_migrations(conn)?;
    let mut count = 0;
    for (name, sql) in MIGRATIONS.iter().filter(|(name, _)| !applied.contains(*name)) {
        apply_migration(conn, name, sql)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_gets_incident_table_with_audit_columns() {
        let mut conn = open_in_memory().expect("open");
        assert_eq!(migrate(&mut conn).expect("migrate"), MIGRATIONS.len());

        let table: String = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='incidents'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(table, "incidents");
        conn.prepare("SELECT notification_reference, notification_digest FROM incidents")
            .expect("audit columns");
    }

    #[test]
    fn rerunning_migrate_applies_nothing() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("first");
        assert_eq!(migrate(&mut conn).expect("second"), 0);

        let recorded: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(recorded, MIGRATIONS.len() as i64);
    }

    #[test]
    fn schema_rejects_deadline_without_requirement() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");

        let err = conn
            .execute(
                r#"
          INSERT INTO incidents (
            id, title, description, incident_type, severity,
            affected_data_categories_json, estimated_affected_individuals,
            discovered_at, status, notification_required, notification_deadline, notified,
            containment_measures_json, created_by, updated_by, created_at, updated_at, version
          ) VALUES (
            'inc-1', 't', 'd', 'data_breach', 'low', '[]', 0,
            '2026-01-01T00:00:00Z', 'open', 0, '2026-01-04T00:00:00Z', 0,
            '[]', 'dpo', 'dpo', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', 1
          )
          "#,
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("CHECK"), "{err}");
    }

    #[test]
    fn open_store_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_store(dir.path()).unwrap_err();
        assert_eq!(err.code, "DB_INVALID_PATH");
    }
}
