//! libSQL backend: async `ProfileStore` implementation.
//!
//! Supports local file and in-memory databases. Every write is a single
//! upsert statement, so a failed write never leaves a half-merged row.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::migrations;
use super::model::{Profile, ProfileChange, ProfilePatch, Role};
use super::store::ProfileStore;
use crate::error::StoreError;
use crate::identity::SubjectId;

/// Change feed capacity. Slow subscribers re-read on lag.
const CHANGE_CAPACITY: usize = 256;

const PROFILE_COLUMNS: &str = "subject, role, onboarded, selected_modules, age, country, \
     onboarding_completed_at, created_at, updated_at";

/// libSQL profile store.
pub struct LibSqlProfileStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    changes: broadcast::Sender<ProfileChange>,
}

impl LibSqlProfileStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Profile store opened");
        Ok(store)
    }

    /// Create an in-memory database.
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    /// Open by configured location; `:memory:` selects an in-memory store.
    pub async fn open(location: &str) -> Result<Self, StoreError> {
        if location == ":memory:" {
            Self::new_memory().await
        } else {
            Self::new_local(Path::new(location)).await
        }
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;

        let (changes, _rx) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            db: Arc::new(db),
            conn,
            changes,
        })
    }

    /// Number of live change-feed listeners.
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run an upsert that `RETURNING`s the profile row, then publish it.
    async fn write(
        &self,
        subject: &SubjectId,
        sql: &str,
        values: Vec<libsql::Value>,
        op: &'static str,
    ) -> Result<Profile, StoreError> {
        let mut rows = self
            .conn()
            .query(sql, libsql::params::Params::Positional(values))
            .await
            .map_err(|e| StoreError::Query(format!("{op}: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("{op}: {e}")))?
            .ok_or_else(|| StoreError::Query(format!("{op}: upsert returned no row")))?;
        let profile = row_to_profile(&row)?;

        debug!(subject = %subject, op, "Profile written");
        // Ok if nobody is listening
        let _ = self.changes.send(ProfileChange {
            subject: subject.clone(),
            profile: profile.clone(),
        });
        Ok(profile)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<i64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

fn row_to_profile(row: &libsql::Row) -> Result<Profile, StoreError> {
    let read = |e: libsql::Error| StoreError::Serialization(format!("profile row: {e}"));

    let subject_str: String = row.get(0).map_err(read)?;
    let role_str: Option<String> = row.get::<String>(1).ok();
    let onboarded: i64 = row.get(2).map_err(read)?;
    let modules_str: String = row.get(3).map_err(read)?;
    let age: Option<i64> = row.get::<i64>(4).ok();
    let country: Option<String> = row.get::<String>(5).ok();
    let completed_str: Option<String> = row.get::<String>(6).ok();
    let created_str: String = row.get(7).map_err(read)?;
    let updated_str: String = row.get(8).map_err(read)?;

    let subject = SubjectId::new(subject_str)
        .ok_or_else(|| StoreError::Serialization("profile row has empty subject".to_string()))?;
    let selected_modules: BTreeSet<String> = serde_json::from_str(&modules_str)
        .map_err(|e| StoreError::Serialization(format!("selected_modules: {e}")))?;

    Ok(Profile {
        subject,
        role: role_str.as_deref().and_then(Role::parse),
        onboarded: onboarded != 0,
        selected_modules,
        age: age.and_then(|a| u32::try_from(a).ok()),
        country,
        onboarding_completed_at: completed_str.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

#[async_trait]
impl ProfileStore for LibSqlProfileStore {
    async fn get(&self, subject: &SubjectId) -> Result<Option<Profile>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE subject = ?1");
        let mut rows = self
            .conn()
            .query(&sql, params![subject.as_str()])
            .await
            .map_err(|e| StoreError::Query(format!("get_profile: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_profile: {e}"))),
        }
    }

    async fn merge(
        &self,
        subject: &SubjectId,
        patch: &ProfilePatch,
    ) -> Result<Profile, StoreError> {
        let now = Utc::now().to_rfc3339();
        let modules = match &patch.selected_modules {
            Some(set) => Some(
                serde_json::to_string(set)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        let sql = format!(
            "INSERT INTO profiles (subject, role, onboarded, selected_modules, age, country,
                                   onboarding_completed_at, created_at, updated_at)
             VALUES (?1, NULL, COALESCE(?2, 0), COALESCE(?3, '[]'), ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT (subject) DO UPDATE SET
                onboarded = COALESCE(?2, profiles.onboarded),
                selected_modules = COALESCE(?3, profiles.selected_modules),
                age = COALESCE(?4, profiles.age),
                country = COALESCE(?5, profiles.country),
                onboarding_completed_at = COALESCE(profiles.onboarding_completed_at, ?6),
                updated_at = ?7
             RETURNING {PROFILE_COLUMNS}"
        );

        let values = vec![
            libsql::Value::Text(subject.as_str().to_string()),
            opt_int(patch.onboarded.map(i64::from)),
            opt_text(modules),
            opt_int(patch.age.map(i64::from)),
            opt_text(patch.country.clone()),
            opt_text(patch.onboarding_completed_at.map(|t| t.to_rfc3339())),
            libsql::Value::Text(now),
        ];
        self.write(subject, &sql, values, "merge_profile").await
    }

    async fn set_role(
        &self,
        subject: &SubjectId,
        role: Option<Role>,
    ) -> Result<Profile, StoreError> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO profiles (subject, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (subject) DO UPDATE SET role = ?2, updated_at = ?3
             RETURNING {PROFILE_COLUMNS}"
        );
        let values = vec![
            libsql::Value::Text(subject.as_str().to_string()),
            opt_text(role.map(|r| r.as_str().to_string())),
            libsql::Value::Text(now),
        ];
        self.write(subject, &sql, values, "set_role").await
    }

    fn changes(&self) -> broadcast::Receiver<ProfileChange> {
        self.changes.subscribe()
    }
}
