//! libSQL backend — async `RecordStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::intake::answers::IntakeAnswers;
use crate::store::migrations;
use crate::store::traits::{PersistedIntakeRecord, RecordStatus, RecordStore};

const RECORD_COLUMNS: &str = "id, answers, status, created_at, updated_at, completed_at";

/// libSQL record store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlRecordStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlRecordStore {
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

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Record store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a libsql Row to a record. Column order matches RECORD_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<PersistedIntakeRecord, StoreError> {
    let query_err = |e: libsql::Error| StoreError::Query(format!("read intake record: {e}"));

    let id_str: String = row.get(0).map_err(query_err)?;
    let answers_str: String = row.get(1).map_err(query_err)?;
    let status_str: String = row.get(2).map_err(query_err)?;
    let created_str: String = row.get(3).map_err(query_err)?;
    let updated_str: String = row.get(4).map_err(query_err)?;
    let completed_str: Option<String> = row.get::<String>(5).ok();

    let id = Uuid::parse_str(&id_str)
        .map_err(|e| StoreError::Query(format!("invalid record id {id_str}: {e}")))?;
    let answers: IntakeAnswers = serde_json::from_str(&answers_str)?;
    let status = status_str.parse().unwrap_or_default();

    Ok(PersistedIntakeRecord {
        id,
        answers,
        status,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
        completed_at: completed_str.as_deref().map(parse_datetime),
    })
}

fn category_column(answers: &IntakeAnswers) -> String {
    answers
        .category
        .map(|c| c.to_string())
        .unwrap_or_default()
}

#[async_trait]
impl RecordStore for LibSqlRecordStore {
    async fn insert(
        &self,
        answers: &IntakeAnswers,
        status: RecordStatus,
    ) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        let answers_json = serde_json::to_string(answers)?;

        self.conn
            .execute(
                "INSERT INTO intake_records
                    (id, name, email, category, answers, status, created_at, updated_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7,
                    CASE WHEN ?6 = 'complete' THEN ?7 ELSE NULL END)",
                params![
                    id.to_string(),
                    answers.name.clone(),
                    answers.email.clone(),
                    category_column(answers),
                    answers_json,
                    status.as_str(),
                    now
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert intake record: {e}")))?;

        debug!(record_id = %id, status = status.as_str(), "Inserted intake record");
        Ok(id)
    }

    async fn update(
        &self,
        id: Uuid,
        answers: &IntakeAnswers,
        status: RecordStatus,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let answers_json = serde_json::to_string(answers)?;

        // A completed record never drops back to pending.
        let count = self
            .conn
            .execute(
                "UPDATE intake_records SET
                    name = ?2,
                    email = ?3,
                    category = ?4,
                    answers = ?5,
                    status = CASE WHEN status = 'complete' THEN 'complete' ELSE ?6 END,
                    completed_at = CASE
                        WHEN completed_at IS NULL AND ?6 = 'complete' THEN ?7
                        ELSE completed_at END,
                    updated_at = ?7
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    answers.name.clone(),
                    answers.email.clone(),
                    category_column(answers),
                    answers_json,
                    status.as_str(),
                    now
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update intake record: {e}")))?;

        if count == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        debug!(record_id = %id, status = status.as_str(), "Updated intake record");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PersistedIntakeRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM intake_records WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get intake record: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get intake record: {e}"))),
        }
    }
}
