//! Durable per-job state
//!
//! One JSON record per job name, overwritten on every state-changing
//! operation (launch, completion, deletion). The record is the only source
//! of truth for later status/logs/cleanup commands.
//!
//! Status values: RUNNING → {SUCCEEDED | FAILED}, any → DELETED (cleanup)

mod job_state;
mod store;

pub use job_state::{BackendRecord, JobState, JobStatus, LocalRecord, RemoteRecord};
pub use store::{StateError, StateStore, STATE_FILE_EXTENSION};

use chrono::{DateTime, SubsecRound, Utc};

/// Current UTC time truncated to whole seconds
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Check if a state is terminal (no further transitions expected)
pub trait TerminalState {
    fn is_terminal(&self) -> bool;
}
