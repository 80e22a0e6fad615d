use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{ensure_unchanged, JobId, JobStore};
use crate::error::StoreError;
use crate::state_machine::JobMap;

/// Process-local store, mainly for tests and the demo.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, JobMap>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStore for InMemoryJobStore {
    fn get(&self, id: JobId) -> Result<Option<JobMap>, StoreError> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(jobs.get(&id).cloned())
    }

    fn insert(&self, id: JobId, entries: JobMap) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        jobs.insert(id, entries);
        Ok(())
    }

    fn replace_if_unchanged(
        &self,
        id: JobId,
        expected: &JobMap,
        entries: JobMap,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let current = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        ensure_unchanged(id, expected, current)?;
        *current = entries;
        Ok(())
    }
}
