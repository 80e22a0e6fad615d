use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::{ensure_unchanged, JobId, JobStore};
use crate::error::StoreError;
use crate::state_machine::JobMap;

/// On-disk document: job id (as text) → flat job record.
type Document = BTreeMap<String, JobMap>;

/// Store backed by a single JSON document, rewritten whole on every write.
///
/// Writes are serialized through an in-process lock and land via a
/// temp-file rename. Separate processes sharing one file are not coordinated.
#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileJobStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Document, StoreError> {
        if !self.path.exists() {
            return Ok(Document::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Document::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write(&self, doc: &Document) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("tmp");
        if let Err(err) = fs::write(&tmp, contents).and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        debug!(path = %self.path.display(), jobs = doc.len(), "job store written");
        Ok(())
    }
}

impl JobStore for FileJobStore {
    fn get(&self, id: JobId) -> Result<Option<JobMap>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read()?.remove(&id.to_string()))
    }

    fn insert(&self, id: JobId, entries: JobMap) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.read()?;
        let key = id.to_string();
        if doc.contains_key(&key) {
            return Err(StoreError::AlreadyExists(id));
        }
        doc.insert(key, entries);
        self.write(&doc)
    }

    fn replace_if_unchanged(
        &self,
        id: JobId,
        expected: &JobMap,
        entries: JobMap,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.read()?;
        let current = doc
            .get_mut(&id.to_string())
            .ok_or(StoreError::NotFound(id))?;
        ensure_unchanged(id, expected, current)?;
        *current = entries;
        self.write(&doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state_machine::{advance, keys, AuthField, AuthorizationFields, Job, Stage};
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 11, 5, 10, 0, 0).unwrap())
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path().join("jobs.json"));
        assert!(store.get(uuid::Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn records_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let clock = clock();

        let id = {
            let store = FileJobStore::open(&path);
            let job = Job::create("GOOGLE", "MICROSOFT", "CONTACTS", &clock);
            let id = store.create(&job).unwrap();
            let next = advance(
                &job,
                AuthorizationFields::new(Stage::Initial).with(AuthField::SessionKey, "sk"),
                &clock,
            )
            .unwrap();
            store.save_transition(id, &job.to_map(), &next).unwrap();
            id
        };

        let reopened = FileJobStore::open(&path);
        let stored = reopened.get(id).unwrap().unwrap();
        assert_eq!(stored[keys::ENCRYPTED_SESSION_KEY], "sk");
        let job = reopened.load(id, &clock).unwrap();
        assert_eq!(job.transfer_data_type(), "CONTACTS");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn stale_writer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::open(dir.path().join("jobs.json"));
        let clock = clock();
        let job = Job::create("A", "B", "PHOTOS", &clock);
        let id = store.create(&job).unwrap();
        let read = store.load_snapshot(id, &clock).unwrap();

        let keyed = |key: &str| {
            advance(
                &read.job,
                AuthorizationFields::new(Stage::Initial).with(AuthField::SessionKey, key),
                &clock,
            )
            .unwrap()
        };
        store.save_transition(id, &read.record, &keyed("first")).unwrap();
        let err = store
            .save_transition(id, &read.record, &keyed("second"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let reopened = FileJobStore::open(store.path());
        assert_eq!(
            reopened.get(id).unwrap().unwrap()[keys::ENCRYPTED_SESSION_KEY],
            "first"
        );
    }

    #[test]
    fn failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the store path makes the final rename fail.
        let path = dir.path().join("jobs.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();

        let store = FileJobStore::open(&path);
        let err = store.write(&Document::new()).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_document_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        fs::write(&path, "{ not json").unwrap();
        let store = FileJobStore::open(&path);
        assert!(matches!(
            store.get(uuid::Uuid::new_v4()),
            Err(StoreError::Json(_))
        ));
    }
}
