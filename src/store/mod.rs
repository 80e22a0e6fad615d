//! Key-value job stores.
//!
//! A store keeps each job as a flat [`JobMap`] keyed by [`JobId`]. The only
//! write that may replace an existing record is [`JobStore::replace_if_unchanged`],
//! which refuses to overwrite a record that differs in any key from the one
//! the caller read.

mod file;
mod memory;

pub use file::FileJobStore;
pub use memory::InMemoryJobStore;

use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::state_machine::{keys, Job, JobMap};

pub type JobId = Uuid;

/// A decoded job together with the exact record it was decoded from.
///
/// The record is the token for the next conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub job: Job,
    pub record: JobMap,
}

pub trait JobStore: Send + Sync {
    fn get(&self, id: JobId) -> Result<Option<JobMap>, StoreError>;

    /// Stores a new record. Fails with `AlreadyExists` if `id` is taken.
    fn insert(&self, id: JobId, entries: JobMap) -> Result<(), StoreError>;

    /// Overwrites the record only if it still equals `expected` key for key.
    fn replace_if_unchanged(
        &self,
        id: JobId,
        expected: &JobMap,
        entries: JobMap,
    ) -> Result<(), StoreError>;

    /// Persists a new job under a fresh id.
    fn create(&self, job: &Job) -> Result<JobId, StoreError> {
        let id = Uuid::new_v4();
        self.insert(id, job.to_map())?;
        info!(%id, export = job.export_service(), import = job.import_service(), "job created");
        Ok(id)
    }

    fn load(&self, id: JobId, clock: &dyn Clock) -> Result<Job, StoreError> {
        Ok(self.load_snapshot(id, clock)?.job)
    }

    fn load_snapshot(&self, id: JobId, clock: &dyn Clock) -> Result<Snapshot, StoreError> {
        let record = self.get(id)?.ok_or(StoreError::NotFound(id))?;
        let job = Job::from_map(&record, clock)?;
        Ok(Snapshot { job, record })
    }

    /// Writes `job` if the stored record is still the one read as `read`.
    fn save_transition(&self, id: JobId, read: &JobMap, job: &Job) -> Result<(), StoreError> {
        self.replace_if_unchanged(id, read, job.to_map())?;
        info!(%id, stage = %job.authorization().stage(), "job transition saved");
        Ok(())
    }
}

/// Fails with `Conflict` unless `current` is exactly `expected`.
fn ensure_unchanged(id: JobId, expected: &JobMap, current: &JobMap) -> Result<(), StoreError> {
    if current == expected {
        return Ok(());
    }
    let found = current
        .get(keys::AUTHORIZATION_STATE)
        .cloned()
        .unwrap_or_default();
    Err(StoreError::Conflict { id, found })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::state_machine::{advance, AuthField, AuthorizationFields, Stage};
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 9, 9, 0, 0).unwrap())
    }

    fn keyed(stage: Stage, key: &str) -> AuthorizationFields {
        AuthorizationFields::new(stage).with(AuthField::SessionKey, key)
    }

    #[test]
    fn ensure_unchanged_reports_conflict() {
        let clock = clock();
        let map = Job::create("A", "B", "PHOTOS", &clock).to_map();
        let id = Uuid::new_v4();

        assert!(ensure_unchanged(id, &map, &map.clone()).is_ok());

        let mut moved = map.clone();
        moved.insert(keys::ENCRYPTED_SESSION_KEY.into(), "sk".into());
        let err = ensure_unchanged(id, &map, &moved).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { id: conflicted, ref found } if conflicted == id && found == "INITIAL"
        ));
    }

    #[test]
    fn racing_transitions_only_one_wins() {
        let clock = clock();
        let store = InMemoryJobStore::new();
        let job = advance(
            &Job::create("A", "B", "PHOTOS", &clock),
            keyed(Stage::Initial, "sk"),
            &clock,
        )
        .unwrap();
        let id = store.create(&job).unwrap();

        // Both sides read the same INITIAL record and derive CREDS_AVAILABLE.
        let seen_by_api = store.load_snapshot(id, &clock).unwrap();
        let seen_by_worker = store.load_snapshot(id, &clock).unwrap();
        let api_job = advance(&seen_by_api.job, keyed(Stage::CredsAvailable, "from-api"), &clock).unwrap();
        let worker_job =
            advance(&seen_by_worker.job, keyed(Stage::CredsAvailable, "from-worker"), &clock).unwrap();

        store.save_transition(id, &seen_by_api.record, &api_job).unwrap();
        let err = store
            .save_transition(id, &seen_by_worker.record, &worker_job)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.load(id, &clock).unwrap();
        assert_eq!(
            stored.authorization().session_key().map(|k| k.as_str()),
            Some("from-api")
        );
    }

    #[test]
    fn racing_keying_at_the_same_stage_only_one_wins() {
        let clock = clock();
        let store = InMemoryJobStore::new();
        let id = store.create(&Job::create("A", "B", "PHOTOS", &clock)).unwrap();

        // Keying a new job keeps it at INITIAL, so the stage alone can't tell the writers apart.
        let seen_by_api = store.load_snapshot(id, &clock).unwrap();
        let seen_by_worker = store.load_snapshot(id, &clock).unwrap();
        let api_job = advance(&seen_by_api.job, keyed(Stage::Initial, "api-key"), &clock).unwrap();
        let worker_job =
            advance(&seen_by_worker.job, keyed(Stage::Initial, "worker-key"), &clock).unwrap();

        assert!(store.save_transition(id, &seen_by_api.record, &api_job).is_ok());
        assert!(matches!(
            store.save_transition(id, &seen_by_worker.record, &worker_job),
            Err(StoreError::Conflict { .. })
        ));

        let stored = store.load(id, &clock).unwrap();
        assert_eq!(
            stored.authorization().session_key().map(|k| k.as_str()),
            Some("api-key")
        );
    }

    #[test]
    fn snapshot_record_matches_stored_map() {
        let clock = clock();
        let store = InMemoryJobStore::new();
        let job = Job::create("A", "B", "PHOTOS", &clock);
        let id = store.create(&job).unwrap();

        let snapshot = store.load_snapshot(id, &clock).unwrap();
        assert_eq!(snapshot.record, job.to_map());
        assert_eq!(Some(snapshot.record), store.get(id).unwrap());
    }

    #[test]
    fn load_missing_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.load(id, &clock()),
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[test]
    fn load_surfaces_codec_errors() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        store.insert(id, JobMap::new()).unwrap();
        assert!(matches!(
            store.load(id, &clock()),
            Err(StoreError::Codec(_))
        ));
    }
}
