//! Local runner
//!
//! Runs a job's entrypoint as a child process with inherited stdio. The
//! command line is the whitespace-split entrypoint, then each `run.args`
//! entry as `--key value`, then `--output_dir <artifacts>/<name>`. A RUNNING
//! record is written before the spawn and a SUCCEEDED/FAILED record after
//! the child exits.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use tracing::{debug, info};

use crate::error::FailureKind;
use crate::job::JobSpec;
use crate::state::{JobState, StateError, StateStore};

/// Exit code when the entrypoint could not be started
pub const EXIT_CODE_SPAWN_FAILED: i32 = 127;

/// Local runner errors. A non-zero child exit is not one of these.
#[derive(Debug, thiserror::Error)]
pub enum LocalRunError {
    #[error("Job '{0}' has an empty entrypoint")]
    EmptyEntrypoint(String),

    #[error("Failed to create artifact directory {path}: {source}")]
    ArtifactDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    State(#[from] StateError),
}

impl LocalRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            LocalRunError::EmptyEntrypoint(_) => FailureKind::Validation.exit_code(),
            LocalRunError::ArtifactDir { .. } => FailureKind::State.exit_code(),
            LocalRunError::Spawn { .. } => EXIT_CODE_SPAWN_FAILED,
            LocalRunError::State(_) => FailureKind::State.exit_code(),
        }
    }
}

/// Render one `run.args` value the way it appears on the command line
fn arg_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Full argv for a job: entrypoint words, `--key value` pairs, `--output_dir`
pub fn build_command(job: &JobSpec) -> Vec<String> {
    let mut cmd: Vec<String> = job
        .run
        .entrypoint
        .split_whitespace()
        .map(str::to_string)
        .collect();

    for (key, value) in &job.run.args {
        cmd.push(format!("--{}", key));
        cmd.push(arg_value(value));
    }

    cmd.push("--output_dir".to_string());
    cmd.push(job.artifact_dir().to_string_lossy().to_string());
    cmd
}

/// Exit code of a finished child; signal deaths map to 128 + signal
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Run `job` locally, recording its state in `store`.
///
/// Returns the child's exit code, which is also the recorded `returncode`.
pub fn run_local(job: &JobSpec, store: &StateStore) -> Result<i32, LocalRunError> {
    let Some(program) = job.run.entrypoint.split_whitespace().next().map(str::to_string) else {
        return Err(LocalRunError::EmptyEntrypoint(job.name.clone()));
    };
    let cmd = build_command(job);

    let artifact_dir = job.artifact_dir();
    fs::create_dir_all(&artifact_dir).map_err(|source| LocalRunError::ArtifactDir {
        path: artifact_dir.clone(),
        source,
    })?;

    let mut state = JobState::local_running(&job.name, cmd.clone(), artifact_dir);
    store.write(&job.name, &state)?;
    info!(job = %job.name, cmd = ?cmd, "starting local run");

    let status = match Command::new(&program).args(&cmd[1..]).status() {
        Ok(status) => status,
        Err(source) => {
            state.finish_local(None);
            store.write(&job.name, &state)?;
            return Err(LocalRunError::Spawn { program, source });
        }
    };

    let code = exit_code_of(status);
    state.finish_local(Some(code));
    store.write(&job.name, &state)?;
    debug!(job = %job.name, returncode = code, status = %state.status, "local run finished");

    Ok(code)
}
