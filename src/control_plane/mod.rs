//! Control-plane capability interface
//!
//! The orchestrator talks to compute, block storage and networking only
//! through [`ControlPlane`]. Two implementations ship with the crate:
//! - [`OpenStackCli`]: drives the `openstack` command-line client
//! - [`MockControlPlane`]: in-process fake with failure injection for tests
//!
//! Every call either succeeds, fails with `NotFound`, or fails with
//! `Remote`. Nothing here retries.

pub mod failure;
pub mod mock;
pub mod openstack;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::signal::Interrupt;
use crate::wait::{poll_until, Poll, WaitError, WaitPolicy};

pub use failure::{FailureConfig, FailureInjector, Op};
pub use mock::MockControlPlane;
pub use openstack::OpenStackCli;

/// Volume status that means ready to attach
pub const VOLUME_AVAILABLE: &str = "available";

/// Volume statuses that end a volume wait with failure
pub const VOLUME_FAILURE_STATUSES: &[&str] = &["error", "error_deleting", "error_restoring"];

/// Instance status that means running
pub const INSTANCE_ACTIVE: &str = "ACTIVE";

/// Instance status that ends an instance wait with failure
pub const INSTANCE_ERROR: &str = "ERROR";

/// Kind of remote (or local) object an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Flavor,
    Network,
    Volume,
    Server,
    Job,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Image => "image",
            ResourceKind::Flavor => "flavor",
            ResourceKind::Network => "network",
            ResourceKind::Volume => "volume",
            ResourceKind::Server => "server",
            ResourceKind::Job => "job",
        };
        f.write_str(s)
    }
}

/// Control-plane call failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("control plane error: {0}")]
    Remote(String),
}

impl ControlPlaneError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlPlaneError::NotFound { .. })
    }
}

/// Result type for control-plane calls
pub type CpResult<T> = Result<T, ControlPlaneError>;

/// Glance image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
}

/// Nova flavor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flavor {
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "VCPUs")]
    pub vcpus: Option<u32>,
    #[serde(default, alias = "RAM")]
    pub ram: Option<u64>,
    #[serde(default, alias = "Disk")]
    pub disk: Option<u64>,
}

/// Neutron network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
}

/// Cinder volume as last observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Size in GB
    pub size: u32,
    pub status: String,
}

/// Nova server as last observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub status: String,
}

/// Block-device mapping for a non-bootable data volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub volume_id: String,
    /// Always `-1`: the volume is never a boot device
    pub boot_index: i32,
    /// Always false: the volume outlives the instance
    pub delete_on_termination: bool,
    /// Guest device slot
    pub device_name: String,
}

impl VolumeAttachment {
    /// Guest device the data volume is attached at
    pub const DEVICE: &'static str = "/dev/vdb";

    /// Attachment for a data volume at the fixed guest slot
    pub fn data_volume(volume_id: &str) -> Self {
        Self {
            volume_id: volume_id.to_string(),
            boot_index: -1,
            delete_on_termination: false,
            device_name: Self::DEVICE.to_string(),
        }
    }
}

/// Parameters for instance creation (resolved ids, not names)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    pub name: String,
    pub image_id: String,
    pub flavor_id: String,
    pub network_id: String,
    /// Plain-text cloud-init payload
    pub user_data: String,
    pub key_name: Option<String>,
    pub security_group: Option<String>,
    pub volume: Option<VolumeAttachment>,
}

/// Identity summary returned by a connectivity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSummary {
    pub region: Option<String>,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
}

/// Narrow interface onto an IaaS control plane
pub trait ControlPlane: Send + Sync {
    fn find_image(&self, name: &str) -> CpResult<Image>;

    fn find_flavor(&self, name: &str) -> CpResult<Flavor>;

    fn find_network(&self, name: &str) -> CpResult<Network>;

    fn create_volume(&self, name: &str, size_gb: u32) -> CpResult<Volume>;

    /// Current state of a volume
    fn get_volume(&self, volume_id: &str) -> CpResult<Volume>;

    fn create_instance(&self, request: &InstanceRequest) -> CpResult<Instance>;

    /// Current state of an instance
    fn get_instance(&self, server_id: &str) -> CpResult<Instance>;

    /// Raw console log; `max_lines` limits output to the last N lines
    fn console_output(&self, server_id: &str, max_lines: Option<u32>) -> CpResult<String>;

    /// Delete an instance. `NotFound` means it is already gone.
    fn delete_instance(&self, server_id: &str) -> CpResult<()>;

    /// Delete a volume. `NotFound` means it is already gone.
    fn delete_volume(&self, volume_id: &str) -> CpResult<()>;

    fn ping(&self) -> CpResult<CloudSummary>;

    fn list_images(&self, limit: usize) -> CpResult<Vec<Image>>;

    fn list_flavors(&self, limit: usize) -> CpResult<Vec<Flavor>>;

    fn list_networks(&self, limit: usize) -> CpResult<Vec<Network>>;

    /// Poll a volume until it reaches `target`, a failure status, the
    /// policy timeout, or an interrupt.
    fn wait_for_volume_status(
        &self,
        volume: &Volume,
        target: &str,
        failures: &[&str],
        policy: &WaitPolicy,
        interrupt: &Interrupt,
    ) -> Result<Volume, WaitError<ControlPlaneError>> {
        poll_until(policy, interrupt, || {
            let current = self.get_volume(&volume.id)?;
            debug!(volume = %current.id, status = %current.status, "volume status");
            if current.status == target {
                Ok(Poll::Ready(current))
            } else if failures.contains(&current.status.as_str()) {
                Ok(Poll::Failed(current.status))
            } else {
                Ok(Poll::Pending(current.status))
            }
        })
    }

    /// Poll an instance until it is ACTIVE, ERROR, the policy timeout, or
    /// an interrupt.
    fn wait_for_instance_running(
        &self,
        instance: &Instance,
        policy: &WaitPolicy,
        interrupt: &Interrupt,
    ) -> Result<Instance, WaitError<ControlPlaneError>> {
        poll_until(policy, interrupt, || {
            let current = self.get_instance(&instance.id)?;
            debug!(server = %current.id, status = %current.status, "server status");
            if current.status.eq_ignore_ascii_case(INSTANCE_ACTIVE) {
                Ok(Poll::Ready(current))
            } else if current.status.eq_ignore_ascii_case(INSTANCE_ERROR) {
                Ok(Poll::Failed(current.status))
            } else {
                Ok(Poll::Pending(current.status))
            }
        })
    }
}

/// Last `n` lines of `text`
pub(crate) fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
