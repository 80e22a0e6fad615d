mod authorization;
mod codec;
mod job;

pub use authorization::{
    AuthField, Authorization, AuthorizationFields, EncryptedCredentials, Presence, Sealed, Stage,
    WorkerKeys,
};
pub use codec::{from_map, keys, to_map, JobMap};
pub use job::{advance, advance_with, Job, JobBuilder, JobState, TransitionPolicy};
