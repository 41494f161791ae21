//! Lifecycle commands: status, logs, cleanup
//!
//! All three start from the state record. None of them guesses: a missing
//! record or a missing server id is reported rather than worked around.

use serde::Serialize;
use tracing::{info, warn};

use crate::control_plane::{ControlPlane, ResourceKind};
use crate::error::OrchestratorError;
use crate::state::{JobState, StateStore};

/// Read the record for `job_name`
pub fn status(store: &StateStore, job_name: &str) -> Result<JobState, OrchestratorError> {
    store
        .read(job_name)?
        .ok_or_else(|| OrchestratorError::ResourceNotFound {
            kind: ResourceKind::Job,
            name: job_name.to_string(),
        })
}

/// Raw console output of the job's instance
pub fn logs(
    store: &StateStore,
    control_plane: &dyn ControlPlane,
    job_name: &str,
    max_lines: Option<u32>,
) -> Result<String, OrchestratorError> {
    let state = status(store, job_name)?;
    let server_id = state
        .server_id()
        .ok_or_else(|| OrchestratorError::ResourceNotFound {
            kind: ResourceKind::Server,
            name: format!("no server recorded for job '{}'", job_name),
        })?;
    Ok(control_plane.console_output(server_id, max_lines)?)
}

/// Cloud to talk to for an existing job: flag, then record, then settings
pub fn select_cloud(
    flag: Option<&str>,
    state: Option<&JobState>,
    configured: Option<&str>,
) -> Option<String> {
    flag.or_else(|| state.and_then(|s| s.cloud()))
        .or(configured)
        .map(str::to_string)
}

/// What happened to the data volume during cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "volume", rename_all = "snake_case")]
pub enum VolumeCleanup {
    /// No volume on record
    None,
    /// Left in place (no `--delete-volume`)
    Kept { id: String },
    /// Deleted, or already gone
    Deleted { id: String },
    /// Delete failed; logged and not propagated
    Failed { id: String, reason: String },
}

/// Result of a cleanup call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// No server id on record; nothing was touched
    NothingToClean,
    /// Server deleted (or already gone) and record marked DELETED
    Deleted {
        server_id: String,
        already_gone: bool,
        #[serde(flatten)]
        volume: VolumeCleanup,
    },
}

/// Delete the job's instance and, if asked, its data volume; then mark the
/// record DELETED. Safe to repeat.
pub fn cleanup(
    store: &StateStore,
    control_plane: &dyn ControlPlane,
    job_name: &str,
    delete_volume: bool,
) -> Result<CleanupOutcome, OrchestratorError> {
    let Some(state) = store.read(job_name)? else {
        info!(job = job_name, "no state record, nothing to clean");
        return Ok(CleanupOutcome::NothingToClean);
    };
    let Some(server_id) = state.server_id().map(str::to_string) else {
        info!(job = job_name, "no server on record, nothing to clean");
        return Ok(CleanupOutcome::NothingToClean);
    };

    let already_gone = match control_plane.delete_instance(&server_id) {
        Ok(()) => false,
        Err(e) if e.is_not_found() => {
            info!(server = %server_id, "server already gone");
            true
        }
        Err(e) => return Err(e.into()),
    };

    let volume = match (state.volume_id(), delete_volume) {
        (None, _) => VolumeCleanup::None,
        (Some(id), false) => VolumeCleanup::Kept { id: id.to_string() },
        (Some(id), true) => match control_plane.delete_volume(id) {
            Ok(()) => VolumeCleanup::Deleted { id: id.to_string() },
            Err(e) if e.is_not_found() => VolumeCleanup::Deleted { id: id.to_string() },
            Err(e) => {
                // The volume may still be detaching from the server
                warn!(volume = id, error = %e, "failed to delete volume; delete it manually");
                VolumeCleanup::Failed {
                    id: id.to_string(),
                    reason: e.to_string(),
                }
            }
        },
    };

    store.update(job_name, |s| s.mark_deleted())?;
    info!(job = job_name, server = %server_id, "marked job DELETED");

    Ok(CleanupOutcome::Deleted {
        server_id,
        already_gone,
        volume,
    })
}
