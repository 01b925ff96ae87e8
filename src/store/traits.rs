//! Storage traits — the row-store collaborator and client-side durable storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::intake::answers::IntakeAnswers;

/// Lifecycle tag of a persisted intake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Draft or awaiting payment.
    #[default]
    Pending,
    /// Reading delivered or payment confirmed.
    Complete,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            other => Err(format!("Unknown record status: {other}")),
        }
    }
}

/// A row in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedIntakeRecord {
    pub id: Uuid,
    pub answers: IntakeAnswers,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// The system of record for intake answers across reloads and the payment
/// redirect round-trip.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a record. Returns the generated identifier.
    async fn insert(&self, answers: &IntakeAnswers, status: RecordStatus)
    -> Result<Uuid, StoreError>;

    /// Overwrite the answers snapshot and status of an existing record.
    async fn update(
        &self,
        id: Uuid,
        answers: &IntakeAnswers,
        status: RecordStatus,
    ) -> Result<(), StoreError>;

    /// Fetch a record by id.
    async fn get(&self, id: Uuid) -> Result<Option<PersistedIntakeRecord>, StoreError>;
}

/// Client-side durable key/value storage, one namespace per session.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Well-known local storage keys.
pub mod storage_keys {
    /// Identifier of the session's persisted record.
    pub const RECORD_ID: &str = "intake_record_id";
    /// Full JSON snapshot of the answers, written only when the row-store
    /// write fails.
    pub const FALLBACK_SNAPSHOT: &str = "intake_fallback_snapshot";
}
