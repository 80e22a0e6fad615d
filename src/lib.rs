//! Transfer job records and the credential-escrow authorization state machine
//! that guards them.
//!
//! A [`Job`](state_machine::Job) owns one [`Authorization`](state_machine::Authorization)
//! whose populated artifacts are fixed by its [`Stage`](state_machine::Stage).
//! Changes go through [`JobBuilder`](state_machine::JobBuilder) or
//! [`advance`](state_machine::advance); persistence goes through the flat map
//! codec and a [`JobStore`](store::JobStore).

pub mod clock;
pub mod config;
pub mod error;
pub mod state_machine;
pub mod store;

pub use error::{JobError, StoreError};
