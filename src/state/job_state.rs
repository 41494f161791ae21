//! Job state record
//!
//! `JobState` carries the fields common to every backend; backend-specific
//! identifiers live in [`BackendRecord`], tagged by `"backend"` in the JSON.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use nova_payload::ObjectDestinations;
use serde::{Deserialize, Serialize};

use super::{now_utc, TerminalState};
use crate::job::Backend;
use crate::run_id::RunId;

/// Job status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Process or instance is running
    Running,
    /// Local process exited zero
    Succeeded,
    /// Local process exited non-zero or could not start
    Failed,
    /// Remote instance was deleted by cleanup (tombstone)
    Deleted,
}

impl TerminalState for JobStatus {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Deleted
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Deleted => write!(f, "DELETED"),
        }
    }
}

/// Identifiers recorded by the local runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Full argv that was spawned
    pub cmd: Vec<String>,

    /// Child exit code (absent while running or if the child never started)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,

    /// Job-specific artifact directory
    pub artifact_dir: PathBuf,
}

/// Identifiers recorded by a remote launch
///
/// Every field is optional on read so that hand-edited or older records still
/// load; commands that need a field check for it and refuse when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RemoteRecord {
    /// clouds.yaml entry used for the launch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,

    /// Attached data volume, if one was provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Object-storage destinations for results/manifest/log
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swift: Option<ObjectDestinations>,
}

/// Backend-specific part of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendRecord {
    Local(LocalRecord),
    Openstack(RemoteRecord),
}

/// The single persisted record for a job name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Job name (state-store key)
    pub name: String,

    /// Current status
    pub status: JobStatus,

    #[serde(flatten)]
    pub backend: BackendRecord,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobState {
    /// Record written by the local runner before spawning
    pub fn local_running(name: &str, cmd: Vec<String>, artifact_dir: PathBuf) -> Self {
        let now = now_utc();
        Self {
            name: name.to_string(),
            status: JobStatus::Running,
            backend: BackendRecord::Local(LocalRecord {
                cmd,
                returncode: None,
                artifact_dir,
            }),
            created_at: Some(now),
            started_at: Some(now),
            finished_at: None,
        }
    }

    /// Record written by a successful remote launch
    pub fn remote_running(name: &str, record: RemoteRecord) -> Self {
        let now = now_utc();
        Self {
            name: name.to_string(),
            status: JobStatus::Running,
            backend: BackendRecord::Openstack(record),
            created_at: Some(now),
            started_at: Some(now),
            finished_at: None,
        }
    }

    /// Move a local record to its terminal state from the child's exit code.
    ///
    /// `None` means the child never produced an exit code (spawn failure).
    pub fn finish_local(&mut self, returncode: Option<i32>) {
        self.status = match returncode {
            Some(0) => JobStatus::Succeeded,
            _ => JobStatus::Failed,
        };
        if let BackendRecord::Local(ref mut local) = self.backend {
            local.returncode = returncode;
        }
        self.finished_at = Some(now_utc());
    }

    /// Mark the record as a deletion tombstone
    pub fn mark_deleted(&mut self) {
        self.status = JobStatus::Deleted;
        self.finished_at = Some(now_utc());
    }

    /// Which backend produced this record
    pub fn backend_kind(&self) -> Backend {
        match self.backend {
            BackendRecord::Local(_) => Backend::Local,
            BackendRecord::Openstack(_) => Backend::Openstack,
        }
    }

    /// Remote fields, if this is a remote record
    pub fn remote(&self) -> Option<&RemoteRecord> {
        match self.backend {
            BackendRecord::Openstack(ref remote) => Some(remote),
            BackendRecord::Local(_) => None,
        }
    }

    /// Local fields, if this is a local record
    pub fn local(&self) -> Option<&LocalRecord> {
        match self.backend {
            BackendRecord::Local(ref local) => Some(local),
            BackendRecord::Openstack(_) => None,
        }
    }

    /// Recorded server id (remote records only)
    pub fn server_id(&self) -> Option<&str> {
        self.remote().and_then(|r| r.server_id.as_deref())
    }

    /// Recorded data volume id (remote records only)
    pub fn volume_id(&self) -> Option<&str> {
        self.remote().and_then(|r| r.volume_id.as_deref())
    }

    /// Recorded cloud name (remote records only)
    pub fn cloud(&self) -> Option<&str> {
        self.remote().and_then(|r| r.cloud.as_deref())
    }

    /// Check if the record is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Serialize to pretty JSON for display
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
