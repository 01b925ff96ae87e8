//! Progressive persistence — best-effort saves of the answers on every stage
//! transition.
//!
//! All saves for a session go through one background task fed by an unbounded
//! queue. Jobs run in order, so the first successful save inserts the record
//! and every later save updates it by the identifier kept in local storage.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::intake::answers::IntakeAnswers;
use crate::store::{LocalStorage, RecordStatus, RecordStore, storage_keys};

enum SaveJob {
    /// Background draft save after a transition.
    Draft { answers: IntakeAnswers },
    /// Authoritative save; the caller waits for the record id.
    Now {
        answers: IntakeAnswers,
        status: RecordStatus,
        ack: oneshot::Sender<Option<Uuid>>,
    },
    /// Resolves once every earlier job has been processed.
    Flush { ack: oneshot::Sender<()> },
}

/// Handle to a session's save queue. Cloning shares the same queue.
#[derive(Clone)]
pub struct ProgressSaver {
    tx: mpsc::UnboundedSender<SaveJob>,
}

impl ProgressSaver {
    /// Start the save worker for one session.
    ///
    /// The worker stops once every handle has been dropped.
    pub fn spawn(store: Arc<dyn RecordStore>, local: Arc<dyn LocalStorage>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = SaveWorker {
            store,
            local,
            record_id: None,
            id_loaded: false,
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Queue a draft save. Never blocks and never reports failure.
    pub fn save(&self, answers: &IntakeAnswers) {
        if self
            .tx
            .send(SaveJob::Draft {
                answers: answers.clone(),
            })
            .is_err()
        {
            warn!("Save worker has stopped; draft save dropped");
        }
    }

    /// Save with `status` after every queued draft and wait for the result.
    ///
    /// Creates the record even when the name is empty. Returns `None` when
    /// the row store could not be written; the snapshot then lives in local
    /// storage under the fallback key.
    pub async fn save_now(&self, answers: &IntakeAnswers, status: RecordStatus) -> Option<Uuid> {
        let (ack, rx) = oneshot::channel();
        let job = SaveJob::Now {
            answers: answers.clone(),
            status,
            ack,
        };
        if self.tx.send(job).is_err() {
            warn!("Save worker has stopped; authoritative save dropped");
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Wait until every job queued so far has been processed.
    pub async fn flush(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(SaveJob::Flush { ack }).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Read the session's record identifier from local storage.
pub async fn stored_record_id(local: &dyn LocalStorage) -> Option<Uuid> {
    match local.get(storage_keys::RECORD_ID).await {
        Ok(Some(raw)) => match raw.parse() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring malformed stored record id");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Failed to read stored record id");
            None
        }
    }
}

/// Read the fallback answers snapshot from local storage, if one was written.
pub async fn fallback_snapshot(local: &dyn LocalStorage) -> Option<IntakeAnswers> {
    let raw = local
        .get(storage_keys::FALLBACK_SNAPSHOT)
        .await
        .inspect_err(|e| warn!(error = %e, "Failed to read fallback snapshot"))
        .ok()??;
    serde_json::from_str(&raw)
        .inspect_err(|e| warn!(error = %e, "Ignoring malformed fallback snapshot"))
        .ok()
}

struct SaveWorker {
    store: Arc<dyn RecordStore>,
    local: Arc<dyn LocalStorage>,
    record_id: Option<Uuid>,
    id_loaded: bool,
}

impl SaveWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SaveJob>) {
        while let Some(job) = rx.recv().await {
            match job {
                SaveJob::Draft { answers } => {
                    self.save(&answers, RecordStatus::Pending, true).await;
                }
                SaveJob::Now {
                    answers,
                    status,
                    ack,
                } => {
                    let id = self.save(&answers, status, false).await;
                    let _ = ack.send(id);
                }
                SaveJob::Flush { ack } => {
                    let _ = ack.send(());
                }
            }
        }
        debug!("Save worker stopped");
    }

    async fn current_id(&mut self) -> Option<Uuid> {
        if !self.id_loaded {
            self.record_id = stored_record_id(self.local.as_ref()).await;
            self.id_loaded = true;
        }
        self.record_id
    }

    /// Insert or update; on failure log and keep a local snapshot.
    async fn save(
        &mut self,
        answers: &IntakeAnswers,
        status: RecordStatus,
        skip_empty_draft: bool,
    ) -> Option<Uuid> {
        let existing = self.current_id().await;
        if existing.is_none() && skip_empty_draft && !answers.has_name() {
            debug!("Skipping draft save until a name is entered");
            return None;
        }

        match self.write(existing, answers, status).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(record_id = ?existing, error = %e, "Failed to save intake record");
                self.write_fallback(answers).await;
                None
            }
        }
    }

    async fn write(
        &mut self,
        existing: Option<Uuid>,
        answers: &IntakeAnswers,
        status: RecordStatus,
    ) -> Result<Uuid, StoreError> {
        if let Some(id) = existing {
            self.store.update(id, answers, status).await?;
            debug!(record_id = %id, status = status.as_str(), "Intake record updated");
            return Ok(id);
        }

        let id = self.store.insert(answers, status).await?;
        self.record_id = Some(id);
        info!(record_id = %id, status = status.as_str(), "Intake record created");
        if let Err(e) = self
            .local
            .set(storage_keys::RECORD_ID, &id.to_string())
            .await
        {
            warn!(record_id = %id, error = %e, "Failed to store record id locally");
        }
        Ok(id)
    }

    async fn write_fallback(&self, answers: &IntakeAnswers) {
        let snapshot = match serde_json::to_string(answers) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to serialize fallback snapshot");
                return;
            }
        };
        if let Err(e) = self
            .local
            .set(storage_keys::FALLBACK_SNAPSHOT, &snapshot)
            .await
        {
            warn!(error = %e, "Failed to write fallback snapshot");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Row-store stub that counts calls and can be switched to fail.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::RwLock;

    use super::*;
    use crate::store::PersistedIntakeRecord;

    #[derive(Default)]
    pub struct CountingStore {
        pub inserts: AtomicUsize,
        pub updates: AtomicUsize,
        pub failing: AtomicBool,
        pub records: RwLock<HashMap<Uuid, PersistedIntakeRecord>>,
    }

    impl CountingStore {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn insert_count(&self) -> usize {
            self.inserts.load(Ordering::SeqCst)
        }

        pub fn update_count(&self) -> usize {
            self.updates.load(Ordering::SeqCst)
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StoreError::Connection("row store unreachable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl RecordStore for CountingStore {
        async fn insert(
            &self,
            answers: &IntakeAnswers,
            status: RecordStatus,
        ) -> Result<Uuid, StoreError> {
            self.check()?;
            self.inserts.fetch_add(1, Ordering::SeqCst);
            let id = Uuid::new_v4();
            let now = Utc::now();
            self.records.write().await.insert(
                id,
                PersistedIntakeRecord {
                    id,
                    answers: answers.clone(),
                    status,
                    created_at: now,
                    updated_at: now,
                    completed_at: None,
                },
            );
            Ok(id)
        }

        async fn update(
            &self,
            id: Uuid,
            answers: &IntakeAnswers,
            status: RecordStatus,
        ) -> Result<(), StoreError> {
            self.check()?;
            self.updates.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.write().await;
            let record = records
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
            record.answers = answers.clone();
            if record.status != RecordStatus::Complete {
                record.status = status;
            }
            record.updated_at = Utc::now();
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<PersistedIntakeRecord>, StoreError> {
            self.check()?;
            Ok(self.records.read().await.get(&id).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CountingStore;
    use super::*;
    use crate::store::MemoryStorage;

    fn named(name: &str) -> IntakeAnswers {
        IntakeAnswers {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn at_most_one_insert_per_session() {
        let store = CountingStore::new();
        let local = Arc::new(MemoryStorage::new());
        let saver = ProgressSaver::spawn(store.clone(), local.clone());

        let mut answers = named("Alex");
        for i in 0..5 {
            answers.set_question(format!("question {i}"));
            saver.save(&answers);
        }
        saver.flush().await;

        assert_eq!(store.insert_count(), 1);
        assert_eq!(store.update_count(), 4);

        let id = stored_record_id(local.as_ref()).await.unwrap();
        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.answers.question, "question 4");
    }

    #[tokio::test]
    async fn empty_name_skips_draft_creation() {
        let store = CountingStore::new();
        let local = Arc::new(MemoryStorage::new());
        let saver = ProgressSaver::spawn(store.clone(), local.clone());

        saver.save(&IntakeAnswers::default());
        saver.save(&named("   "));
        saver.flush().await;

        assert_eq!(store.insert_count(), 0);
        assert!(stored_record_id(local.as_ref()).await.is_none());
    }

    #[tokio::test]
    async fn reuses_identifier_from_local_storage() {
        let store = CountingStore::new();
        let local = Arc::new(MemoryStorage::new());

        let first = ProgressSaver::spawn(store.clone(), local.clone());
        let id = first
            .save_now(&named("Alex"), RecordStatus::Pending)
            .await
            .unwrap();
        drop(first);

        // A reloaded session picks the identifier back up.
        let second = ProgressSaver::spawn(store.clone(), local.clone());
        let again = second
            .save_now(&named("Alex"), RecordStatus::Pending)
            .await
            .unwrap();
        assert_eq!(id, again);
        assert_eq!(store.insert_count(), 1);
    }

    #[tokio::test]
    async fn failure_writes_fallback_snapshot() {
        let store = CountingStore::new();
        store.set_failing(true);
        let local = Arc::new(MemoryStorage::new());
        let saver = ProgressSaver::spawn(store.clone(), local.clone());

        let mut answers = named("Alex");
        answers.set_email("alex@real.com");
        assert!(saver.save_now(&answers, RecordStatus::Pending).await.is_none());

        let snapshot = fallback_snapshot(local.as_ref()).await.unwrap();
        assert_eq!(snapshot, answers);
        assert!(stored_record_id(local.as_ref()).await.is_none());
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let store = CountingStore::new();
        let local = Arc::new(MemoryStorage::new());
        let saver = ProgressSaver::spawn(store.clone(), local.clone());

        store.set_failing(true);
        saver.save(&named("Alex"));
        saver.flush().await;
        assert_eq!(store.insert_count(), 0);

        store.set_failing(false);
        saver.save(&named("Alex"));
        saver.save(&named("Alex"));
        saver.flush().await;
        assert_eq!(store.insert_count(), 1);
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn save_now_creates_even_without_name() {
        let store = CountingStore::new();
        let local = Arc::new(MemoryStorage::new());
        let saver = ProgressSaver::spawn(store.clone(), local);

        let id = saver
            .save_now(&IntakeAnswers::default(), RecordStatus::Pending)
            .await;
        assert!(id.is_some());
    }

    #[tokio::test]
    async fn malformed_stored_id_is_ignored() {
        let local = MemoryStorage::new();
        local.set(storage_keys::RECORD_ID, "not-a-uuid").await.unwrap();
        assert!(stored_record_id(&local).await.is_none());
    }
}
