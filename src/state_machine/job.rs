use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::authorization::{Authorization, AuthorizationFields};
use crate::clock::Clock;
use crate::error::JobError;

/// Overall lifecycle of a transfer job, independent of the escrow stage.
///
/// NEW → COMPLETE | ERROR. Terminal states never move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    New,
    Complete,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Error)
    }

    /// Re-asserting the current state is always allowed.
    pub fn can_transition_to(self, next: JobState) -> bool {
        self == next || self == JobState::New
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::New => write!(f, "NEW"),
            JobState::Complete => write!(f, "COMPLETE"),
            JobState::Error => write!(f, "ERROR"),
        }
    }
}

/// How a submitted authorization relates to the one it replaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Only the per-stage field table is checked. Any stage may follow any other.
    #[default]
    Lenient,
    /// Additionally rejects a stage that orders before the current one.
    ForwardOnly,
}

/// The record of a single data-transfer job.
///
/// Fields are read-only; every change goes through [`Job::to_builder`].
/// Deserializing rejects a job whose last update precedes its creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "JobFields")]
pub struct Job {
    state: JobState,
    export_service: String,
    import_service: String,
    transfer_data_type: String,
    created_timestamp: DateTime<Utc>,
    last_update_timestamp: DateTime<Utc>,
    #[serde(rename = "jobAuthorization")]
    authorization: Authorization,
}

/// Wire shape of [`Job`] before the timestamp order is checked.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobFields {
    state: JobState,
    export_service: String,
    import_service: String,
    transfer_data_type: String,
    created_timestamp: DateTime<Utc>,
    last_update_timestamp: DateTime<Utc>,
    #[serde(rename = "jobAuthorization")]
    authorization: Authorization,
}

impl TryFrom<JobFields> for Job {
    type Error = JobError;

    fn try_from(fields: JobFields) -> Result<Self, Self::Error> {
        if fields.created_timestamp > fields.last_update_timestamp {
            return Err(JobError::TimestampOrder {
                created: fields.created_timestamp,
                last_update: fields.last_update_timestamp,
            });
        }
        Ok(Self {
            state: fields.state,
            export_service: fields.export_service,
            import_service: fields.import_service,
            transfer_data_type: fields.transfer_data_type,
            created_timestamp: fields.created_timestamp,
            last_update_timestamp: fields.last_update_timestamp,
            authorization: fields.authorization,
        })
    }
}

impl Job {
    /// A new job: state NEW, equal timestamps, unkeyed INITIAL authorization.
    pub fn create(
        export_service: impl Into<String>,
        import_service: impl Into<String>,
        transfer_data_type: impl Into<String>,
        clock: &dyn Clock,
    ) -> Self {
        Self::restore(
            export_service.into(),
            import_service.into(),
            transfer_data_type.into(),
            Authorization::default(),
            clock,
        )
    }

    /// Rebuilds a job from persisted parts. State and timestamps are fresh.
    pub(crate) fn restore(
        export_service: String,
        import_service: String,
        transfer_data_type: String,
        authorization: Authorization,
        clock: &dyn Clock,
    ) -> Self {
        let now = clock.now();
        Self {
            state: JobState::New,
            export_service,
            import_service,
            transfer_data_type,
            created_timestamp: now,
            last_update_timestamp: now,
            authorization,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn export_service(&self) -> &str {
        &self.export_service
    }

    pub fn import_service(&self) -> &str {
        &self.import_service
    }

    pub fn transfer_data_type(&self) -> &str {
        &self.transfer_data_type
    }

    pub fn created_timestamp(&self) -> DateTime<Utc> {
        self.created_timestamp
    }

    pub fn last_update_timestamp(&self) -> DateTime<Utc> {
        self.last_update_timestamp
    }

    pub fn authorization(&self) -> &Authorization {
        &self.authorization
    }

    /// A staging copy of this job. Building from it never touches `self`.
    pub fn to_builder(&self) -> JobBuilder {
        JobBuilder {
            job: self.clone(),
            policy: TransitionPolicy::default(),
        }
    }
}

/// Stages changes to a [`Job`] and commits them with a fresh update timestamp.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    job: Job,
    policy: TransitionPolicy,
}

impl JobBuilder {
    pub fn policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validates `next` against its stage's field table and stages it.
    ///
    /// On failure the builder is consumed and nothing is applied; the job it
    /// came from is unchanged.
    pub fn set_authorization(
        mut self,
        next: impl Into<AuthorizationFields>,
    ) -> Result<Self, JobError> {
        let fields = next.into();
        let from = self.job.authorization.stage();
        let to = fields.stage;

        let validated = fields.check().and_then(|()| {
            if self.policy == TransitionPolicy::ForwardOnly && to < from {
                return Err(JobError::IllegalStageTransition { from, to });
            }
            Authorization::try_from(fields)
        });

        match validated {
            Ok(authorization) => {
                debug!(%from, %to, "authorization accepted");
                self.job.authorization = authorization;
                Ok(self)
            }
            Err(err) => {
                warn!(%from, %to, %err, "authorization rejected");
                Err(err)
            }
        }
    }

    /// Moves the overall job state. Terminal states are final.
    pub fn set_state(mut self, next: JobState) -> Result<Self, JobError> {
        let from = self.job.state;
        if !from.can_transition_to(next) {
            return Err(JobError::IllegalJobStateTransition { from, to: next });
        }
        self.job.state = next;
        Ok(self)
    }

    /// Commits the staged job.
    ///
    /// `lastUpdateTimestamp` becomes `clock.now()`, but never moves backwards.
    pub fn build(mut self, clock: &dyn Clock) -> Job {
        self.job.last_update_timestamp = clock.now().max(self.job.last_update_timestamp);
        self.job
    }
}

/// Validates `next` and returns the evolved job. `job` itself is untouched.
pub fn advance(
    job: &Job,
    next: impl Into<AuthorizationFields>,
    clock: &dyn Clock,
) -> Result<Job, JobError> {
    advance_with(job, next, TransitionPolicy::Lenient, clock)
}

pub fn advance_with(
    job: &Job,
    next: impl Into<AuthorizationFields>,
    policy: TransitionPolicy,
    clock: &dyn Clock,
) -> Result<Job, JobError> {
    Ok(job
        .to_builder()
        .policy(policy)
        .set_authorization(next)?
        .build(clock))
}
