mod base;
mod v1_to_v2;

use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

use crate::error::QaDeskError;

use base::CREATE_SCHEMA_SQL;
use v1_to_v2::UPGRADE_1_TO_2_SQL;

const CREATE_META_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// One step of the schema history. Applying a migration moves the database
/// from `version - 1` to `version`.
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub const fn new(version: u32, description: &'static str, sql: &'static str) -> Self {
        Self {
            version,
            description,
            sql,
        }
    }
}

pub const MIGRATION_0_TO_1: Migration = Migration::new(1, "create qa_pairs", CREATE_SCHEMA_SQL);
pub const MIGRATION_1_TO_2: Migration =
    Migration::new(2, "index qa_pairs.question", UPGRADE_1_TO_2_SQL);

/// Ordered by version, contiguous from 1.
pub const MIGRATIONS: [Migration; 2] = [MIGRATION_0_TO_1, MIGRATION_1_TO_2];

pub const CURRENT_SCHEMA_VERSION: u32 = MIGRATIONS[MIGRATIONS.len() - 1].version;

/// Returns the recorded schema version, 0 for a database that has none.
pub fn stored_version(conn: &Connection) -> Result<u32, QaDeskError> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(v) => v
            .parse::<u32>()
            .map_err(|_| QaDeskError::Error(format!("Invalid schema version '{}' in meta table", v))),
    }
}

/// Brings the database up to `CURRENT_SCHEMA_VERSION`.
///
/// Each migration runs in its own immediate transaction together with the
/// version bump, and the stored version is re-read inside that transaction, so
/// running this concurrently or repeatedly applies every migration exactly once.
pub fn ensure_schema(conn: &mut Connection) -> Result<u32, QaDeskError> {
    conn.execute_batch(CREATE_META_SQL)?;

    let stored = stored_version(conn)?;
    if stored > CURRENT_SCHEMA_VERSION {
        return Err(QaDeskError::Error(format!(
            "Database schema version {} is newer than the supported version {}",
            stored, CURRENT_SCHEMA_VERSION
        )));
    }

    if stored == CURRENT_SCHEMA_VERSION {
        debug!("Schema is current at version {}", stored);
        return Ok(stored);
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > stored) {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if stored_version(&tx)? >= migration.version {
            continue;
        }

        info!(
            "Applying schema migration {} → {} ({})",
            migration.version - 1,
            migration.version,
            migration.description
        );

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
            [migration.version.to_string()],
        )?;
        tx.commit()?;
    }

    stored_version(conn)
}
