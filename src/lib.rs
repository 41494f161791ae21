//! nova-mlops - short-lived single-node compute jobs
//!
//! Runs a job described by a small spec file either as a local child
//! process or on an OpenStack cloud: resolve image/flavor/network, provision
//! an optional data volume, boot an instance with a cloud-init payload, and
//! track the job in a per-name JSON state record for status, logs and
//! cleanup.

pub mod config;
pub mod control_plane;
pub mod error;
pub mod job;
pub mod launch;
pub mod lifecycle;
pub mod local;
pub mod probe;
pub mod run_id;
pub mod signal;
pub mod state;
pub mod wait;

pub use config::{CliOverrides, EffectiveConfig, Settings};
pub use control_plane::{ControlPlane, ControlPlaneError, MockControlPlane, OpenStackCli};
pub use error::{FailureKind, OrchestratorError};
pub use job::{Backend, JobSpec};
pub use launch::{LaunchResult, LaunchSpec, Orchestrator};
pub use lifecycle::CleanupOutcome;
pub use local::{run_local, LocalRunError};
pub use run_id::RunId;
pub use signal::Interrupt;
pub use state::{JobState, JobStatus, StateStore};
pub use wait::WaitPolicy;
