//! Projection between a [`Job`] and the flat string map a key-value job store
//! persists.
//!
//! The projection is lossy: the job's `state` and both timestamps are never
//! written, and [`from_map`] always yields a NEW job stamped with the clock's
//! current instant. Stores that need those values must keep them elsewhere.
//!
//! Decoding fails with `MissingRequiredField` when a mandatory key is absent,
//! `UnknownStage` when the stage name is not recognized, and
//! `InvalidAuthorizationState` when the artifacts contradict the stage.

use std::collections::BTreeMap;

use super::authorization::{AuthField, Authorization, AuthorizationFields, Stage};
use super::job::Job;
use crate::clock::Clock;
use crate::error::JobError;

/// Flat persisted form of a job.
pub type JobMap = BTreeMap<String, String>;

/// Keys of the persisted job record.
pub mod keys {
    pub const DATA_TYPE: &str = "DATA_TYPE";
    pub const EXPORT_SERVICE: &str = "EXPORT_SERVICE";
    pub const IMPORT_SERVICE: &str = "IMPORT_SERVICE";
    pub const AUTHORIZATION_STATE: &str = "AUTHORIZATION_STATE";
    pub const ENCRYPTED_SESSION_KEY: &str = "ENCRYPTED_SESSION_KEY";
    pub const EXPORT_ENCRYPTED_CREDS_KEY: &str = "EXPORT_ENCRYPTED_CREDS_KEY";
    pub const IMPORT_ENCRYPTED_CREDS_KEY: &str = "IMPORT_ENCRYPTED_CREDS_KEY";
    pub const WORKER_INSTANCE_PUBLIC_KEY: &str = "WORKER_INSTANCE_PUBLIC_KEY";
    pub const WORKER_INSTANCE_PRIVATE_KEY: &str = "WORKER_INSTANCE_PRIVATE_KEY";
}

/// Store key for each encrypted artifact.
fn key_for(field: AuthField) -> &'static str {
    match field {
        AuthField::SessionKey => keys::ENCRYPTED_SESSION_KEY,
        AuthField::ExportAuthData => keys::EXPORT_ENCRYPTED_CREDS_KEY,
        AuthField::ImportAuthData => keys::IMPORT_ENCRYPTED_CREDS_KEY,
        AuthField::PublicKey => keys::WORKER_INSTANCE_PUBLIC_KEY,
        AuthField::PrivateKey => keys::WORKER_INSTANCE_PRIVATE_KEY,
    }
}

/// Writes services, data type, stage name and session key always; the other
/// four artifacts only when populated.
pub fn to_map(job: &Job) -> JobMap {
    let auth = job.authorization();
    let mut map = JobMap::new();
    map.insert(keys::DATA_TYPE.into(), job.transfer_data_type().into());
    map.insert(keys::EXPORT_SERVICE.into(), job.export_service().into());
    map.insert(keys::IMPORT_SERVICE.into(), job.import_service().into());
    map.insert(keys::AUTHORIZATION_STATE.into(), auth.stage().as_str().into());
    map.insert(
        keys::ENCRYPTED_SESSION_KEY.into(),
        auth.session_key()
            .map(|k| k.as_str().to_string())
            .unwrap_or_default(),
    );

    for field in &AuthField::ALL[1..] {
        if let Some(value) = auth.field(*field) {
            map.insert(key_for(*field).into(), value.as_str().into());
        }
    }
    map
}

/// Rebuilds a job from its persisted form.
///
/// State is always NEW and both timestamps are `clock.now()`, whatever the map
/// holds. Besides a missing key, an unrecognized stage name or artifacts that
/// break the stage's field rules are rejected.
pub fn from_map(entries: &JobMap, clock: &dyn Clock) -> Result<Job, JobError> {
    let required = |key: &'static str| {
        entries
            .get(key)
            .cloned()
            .ok_or(JobError::MissingRequiredField(key))
    };

    let export_service = required(keys::EXPORT_SERVICE)?;
    let import_service = required(keys::IMPORT_SERVICE)?;
    let transfer_data_type = required(keys::DATA_TYPE)?;
    let stage: Stage = required(keys::AUTHORIZATION_STATE)?.parse()?;
    let session_key = required(keys::ENCRYPTED_SESSION_KEY)?;

    let mut fields = AuthorizationFields::new(stage).with(AuthField::SessionKey, session_key);
    for field in &AuthField::ALL[1..] {
        if let Some(value) = entries.get(key_for(*field)) {
            fields = fields.with(*field, value.as_str());
        }
    }

    Ok(Job::restore(
        export_service,
        import_service,
        transfer_data_type,
        Authorization::try_from(fields)?,
        clock,
    ))
}

impl Job {
    pub fn to_map(&self) -> JobMap {
        to_map(self)
    }

    pub fn from_map(entries: &JobMap, clock: &dyn Clock) -> Result<Job, JobError> {
        from_map(entries, clock)
    }
}
