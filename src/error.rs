use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::state_machine::{AuthField, JobState, Presence, Stage};

/// Failures raised by the job core: validated transitions and map decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The authorization's fields do not match what its stage allows.
    #[error("invalid authorization state: stage {stage} {rule} {field}")]
    InvalidAuthorizationState {
        stage: Stage,
        field: AuthField,
        rule: Presence,
    },

    /// A mandatory key is absent from a stored job record.
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    /// A stored stage name is not one of the known stages.
    #[error("unknown authorization stage: {0}")]
    UnknownStage(String),

    /// The next stage orders before the current one (forward-only policy).
    #[error("illegal stage transition: {from} -> {to}")]
    IllegalStageTransition { from: Stage, to: Stage },

    /// Terminal job states never transition.
    #[error("illegal job state transition: {from} -> {to}")]
    IllegalJobStateTransition { from: JobState, to: JobState },

    /// A transported job was last updated before it was created.
    #[error("created timestamp {created} is after last update timestamp {last_update}")]
    TimestampOrder {
        created: DateTime<Utc>,
        last_update: DateTime<Utc>,
    },
}

/// Failures raised by a [`JobStore`](crate::store::JobStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("job already exists: {0}")]
    AlreadyExists(uuid::Uuid),

    /// Another writer changed the record after it was read.
    #[error("job {id} was modified concurrently (now at stage {found})")]
    Conflict { id: uuid::Uuid, found: String },

    #[error("stored record is invalid: {0}")]
    Codec(#[from] JobError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
