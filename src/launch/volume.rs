//! Data volume provisioning
//!
//! Creates a block-storage volume and blocks until it is `available`. The
//! volume is billable and outlives any later launch failure; its id has to
//! reach the state record (or the error message) so it can be cleaned up.

use tracing::info;

use crate::control_plane::{
    ControlPlane, ResourceKind, Volume, VolumeAttachment, VOLUME_AVAILABLE,
    VOLUME_FAILURE_STATUSES,
};
use crate::error::OrchestratorError;
use crate::signal::Interrupt;
use crate::wait::WaitPolicy;

/// A ready volume plus how to attach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub volume: Volume,
    pub attachment: VolumeAttachment,
}

impl VolumeDescriptor {
    pub fn id(&self) -> &str {
        &self.volume.id
    }
}

/// Normalize a requested size: absent, zero or negative means no volume
pub fn requested_size(size_gb: Option<i64>) -> Result<Option<u32>, OrchestratorError> {
    match size_gb {
        Some(size) if size > 0 => u32::try_from(size).map(Some).map_err(|_| {
            OrchestratorError::Validation(format!("volume size {} GB is out of range", size))
        }),
        _ => Ok(None),
    }
}

/// Default volume name for a job
pub fn default_volume_name(job_name: &str) -> String {
    format!("mlops-{}-results", job_name)
}

/// Create a volume and wait for it to become available
pub fn provision_volume(
    control_plane: &dyn ControlPlane,
    name: &str,
    size_gb: u32,
    policy: &WaitPolicy,
    interrupt: &Interrupt,
) -> Result<VolumeDescriptor, OrchestratorError> {
    let volume = control_plane.create_volume(name, size_gb)?;
    info!(volume = %volume.id, name, size_gb, "created volume, waiting for it to become available");

    let pending = format!("volume {}", volume.id);
    interrupt.state().register_pending(&pending);
    let waited = control_plane.wait_for_volume_status(
        &volume,
        VOLUME_AVAILABLE,
        VOLUME_FAILURE_STATUSES,
        policy,
        interrupt,
    );
    interrupt.state().unregister_pending(&pending);

    let ready = waited
        .map_err(|e| OrchestratorError::from_wait(ResourceKind::Volume, &volume.id, e))?;

    Ok(VolumeDescriptor {
        attachment: VolumeAttachment::data_volume(&ready.id),
        volume: ready,
    })
}
