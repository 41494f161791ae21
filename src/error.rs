//! Orchestration errors and exit codes
//!
//! Launch and lifecycle commands return [`OrchestratorError`]; the binary
//! maps it through [`FailureKind`] to a stable process exit code.

use nova_payload::PayloadError;

use crate::config::ConfigError;
use crate::control_plane::{ControlPlaneError, ResourceKind};
use crate::job::JobSpecError;
use crate::signal::EXIT_CODE_INTERRUPTED;
use crate::state::StateError;
use crate::wait::WaitError;

/// Failure classes with stable exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FailureKind {
    /// Named image/flavor/network/job/server absent (exit code 2)
    NotFound = 2,
    /// Bad job spec, flags or configuration (exit code 3)
    Validation = 3,
    /// Volume or instance reached an error state or timed out (exit code 4)
    Provisioning = 4,
    /// Control-plane call failed (exit code 5)
    RemoteUnavailable = 5,
    /// State store unreadable or unwritable (exit code 6)
    State = 6,
    /// Interrupted by SIGINT/SIGTERM (exit code 130)
    Interrupted = EXIT_CODE_INTERRUPTED,
}

impl FailureKind {
    pub fn exit_code(&self) -> i32 {
        *self as i32
    }
}

/// Errors from launch and lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("{kind} not found: {name}")]
    ResourceNotFound { kind: ResourceKind, name: String },

    #[error("{kind} {id} failed to provision: {reason}")]
    ProvisioningFailed {
        kind: ResourceKind,
        id: String,
        reason: String,
    },

    #[error("control plane unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("interrupted while waiting for {kind} {id}; it was left in place")]
    Interrupted { kind: ResourceKind, id: String },

    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("invalid job: {0}")]
    Job(#[from] JobSpecError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Validation(String),
}

impl From<ControlPlaneError> for OrchestratorError {
    fn from(err: ControlPlaneError) -> Self {
        match err {
            ControlPlaneError::NotFound { kind, name } => {
                OrchestratorError::ResourceNotFound { kind, name }
            }
            ControlPlaneError::Remote(message) => OrchestratorError::RemoteUnavailable(message),
        }
    }
}

impl OrchestratorError {
    /// Fold the outcome of a bounded wait on `kind`/`id` into the taxonomy
    pub fn from_wait(kind: ResourceKind, id: &str, err: WaitError<ControlPlaneError>) -> Self {
        match err {
            WaitError::Failed { status } => OrchestratorError::ProvisioningFailed {
                kind,
                id: id.to_string(),
                reason: format!("reached status '{}'", status),
            },
            WaitError::TimedOut {
                waited,
                last_status,
            } => OrchestratorError::ProvisioningFailed {
                kind,
                id: id.to_string(),
                reason: format!(
                    "still '{}' after {}s",
                    last_status,
                    waited.as_secs()
                ),
            },
            WaitError::Interrupted => OrchestratorError::Interrupted {
                kind,
                id: id.to_string(),
            },
            WaitError::Poll(e) => e.into(),
        }
    }

    /// Map error to failure kind for exit code
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            OrchestratorError::ResourceNotFound { .. } => FailureKind::NotFound,
            OrchestratorError::ProvisioningFailed { .. } => FailureKind::Provisioning,
            OrchestratorError::RemoteUnavailable(_) => FailureKind::RemoteUnavailable,
            OrchestratorError::Interrupted { .. } => FailureKind::Interrupted,
            OrchestratorError::Payload(_) => FailureKind::Validation,
            OrchestratorError::State(StateError::InvalidName(_)) => FailureKind::Validation,
            OrchestratorError::State(_) => FailureKind::State,
            OrchestratorError::Job(_) => FailureKind::Validation,
            OrchestratorError::Config(_) => FailureKind::Validation,
            OrchestratorError::Validation(_) => FailureKind::Validation,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.failure_kind().exit_code()
    }
}
