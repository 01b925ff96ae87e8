//! Persistence layer — the intake record store and local durable storage.

pub mod libsql_backend;
pub mod local;
pub(crate) mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlRecordStore;
pub use local::{FileStorage, MemoryStorage};
pub use traits::{LocalStorage, PersistedIntakeRecord, RecordStatus, RecordStore, storage_keys};
