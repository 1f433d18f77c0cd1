//! Version-tracked schema migrations for the libSQL profile store.
//!
//! Each migration has a version number and SQL. `run_migrations()` reads the
//! highest applied version from `_migrations` and applies only newer ones.

use libsql::Connection;
use tracing::{debug, info};

use crate::error::StoreError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "profiles",
        sql: r#"
            CREATE TABLE IF NOT EXISTS profiles (
                subject TEXT PRIMARY KEY,
                role TEXT,
                onboarded INTEGER NOT NULL DEFAULT 0,
                selected_modules TEXT NOT NULL DEFAULT '[]',
                age INTEGER,
                country TEXT,
                onboarding_completed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "profiles_role_index",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_profiles_role ON profiles(role);
        "#,
    },
];

/// Run all pending migrations against the given connection.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| StoreError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                StoreError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            conn.execute(
                "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
                libsql::params![migration.version, migration.name],
            )
            .await
            .map_err(|e| {
                StoreError::Migration(format!("Failed to record V{}: {e}", migration.version))
            })?;
        }
    }

    debug!(version = latest_version(), "Profile schema up to date");
    Ok(())
}

/// Highest applied migration version, or 0 if none.
pub(crate) async fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| StoreError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| StoreError::Migration(format!("Failed to parse migration version: {e}"))),
        None => Ok(0),
    }
}

/// Latest version known to this build.
pub(crate) fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
