//! Launch orchestration
//!
//! Turns a [`LaunchSpec`] into a running instance:
//! 1. resolve image/flavor/network
//! 2. generate a run id and derive object-storage destinations
//! 3. provision the optional data volume and wait for it
//! 4. render the bootstrap payload
//! 5. create the instance and wait for ACTIVE
//! 6. persist a RUNNING state record
//!
//! Each step's failure aborts the rest. Nothing is rolled back: a volume or
//! instance created before a later failure stays, and the error (or a
//! warning) names it.

mod resolve;
mod volume;

pub use resolve::{resolve_resources, ResolvedResources};
pub use volume::{default_volume_name, provision_volume, requested_size, VolumeDescriptor};

use nova_payload::{ObjectDestinations, PayloadBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{OpenStackSettings, Settings};
use crate::control_plane::{ControlPlane, InstanceRequest, ResourceKind};
use crate::error::OrchestratorError;
use crate::job::{validate_job_name, Backend, JobSpec};
use crate::run_id::RunId;
use crate::signal::Interrupt;
use crate::state::{JobState, RemoteRecord, StateStore};
use crate::wait::WaitPolicy;

/// Default object-storage container
pub const DEFAULT_OBJECT_CONTAINER: &str = "mlops-artifacts";

/// Validated input for one remote launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub job_name: String,
    /// clouds.yaml entry recorded in state for later logs/cleanup
    pub cloud: Option<String>,
    pub image: String,
    pub flavor: String,
    pub network: String,
    /// Zero, negative or absent means no data volume
    pub volume_size_gb: Option<i64>,
    /// Overrides the default `mlops-<job>-results` volume name
    pub volume_name: Option<String>,
    pub key_name: Option<String>,
    pub security_group: Option<String>,
}

impl LaunchSpec {
    /// Launch of `job_name` using configured defaults for every resource
    pub fn new(job_name: &str, settings: &OpenStackSettings) -> Self {
        Self {
            job_name: job_name.to_string(),
            cloud: settings.cloud.clone(),
            image: settings.image.clone(),
            flavor: settings.flavor.clone(),
            network: settings.network.clone(),
            volume_size_gb: Some(settings.volume_size_gb),
            volume_name: None,
            key_name: None,
            security_group: None,
        }
    }

    /// Launch derived from a job file; unset resources fall back to settings
    pub fn from_job(job: &JobSpec, settings: &OpenStackSettings) -> Result<Self, OrchestratorError> {
        if job.resources.cloud != Backend::Openstack {
            return Err(OrchestratorError::Validation(format!(
                "job '{}' targets backend '{}', not openstack",
                job.name, job.resources.cloud
            )));
        }

        let resources = &job.resources;
        let mut spec = Self::new(&job.name, settings);
        if let Some(ref image) = resources.image {
            spec.image = image.clone();
        }
        if let Some(ref flavor) = resources.flavor {
            spec.flavor = flavor.clone();
        }
        if let Some(ref network) = resources.network {
            spec.network = network.clone();
        }
        if resources.volume_gb.is_some() {
            spec.volume_size_gb = resources.volume_gb;
        }
        spec.key_name = resources.keypair.clone();
        spec.security_group = resources.security_group.clone();
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        validate_job_name(&self.job_name)?;
        for (field, value) in [
            ("image", &self.image),
            ("flavor", &self.flavor),
            ("network", &self.network),
        ] {
            if value.trim().is_empty() {
                return Err(OrchestratorError::Validation(format!(
                    "{} name must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Unique per-launch instance name
    pub fn instance_name(&self, run_id: &RunId) -> String {
        format!("mlops-{}-{}", self.job_name, run_id)
    }
}

/// What a successful launch produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchResult {
    pub server_id: String,
    pub server_name: String,
    pub run_id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_id: Option<String>,
    pub destinations: ObjectDestinations,
}

/// Drives one launch against a control plane and records the outcome
pub struct Orchestrator<'a> {
    control_plane: &'a dyn ControlPlane,
    payload: &'a dyn PayloadBuilder,
    store: &'a StateStore,
    object_container: String,
    volume_policy: WaitPolicy,
    instance_policy: WaitPolicy,
    interrupt: Interrupt,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        control_plane: &'a dyn ControlPlane,
        payload: &'a dyn PayloadBuilder,
        store: &'a StateStore,
    ) -> Self {
        Self {
            control_plane,
            payload,
            store,
            object_container: DEFAULT_OBJECT_CONTAINER.to_string(),
            volume_policy: WaitPolicy::default(),
            instance_policy: WaitPolicy::default(),
            interrupt: Interrupt::new(),
        }
    }

    /// Take container and wait policies from settings
    pub fn with_settings(mut self, settings: &Settings) -> Result<Self, OrchestratorError> {
        self.object_container = settings.openstack.object_container.clone();
        self.volume_policy = settings.wait.volume_policy()?;
        self.instance_policy = settings.wait.instance_policy()?;
        Ok(self)
    }

    pub fn with_policies(mut self, volume: WaitPolicy, instance: WaitPolicy) -> Self {
        self.volume_policy = volume;
        self.instance_policy = instance;
        self
    }

    pub fn with_object_container(mut self, container: impl Into<String>) -> Self {
        self.object_container = container.into();
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Run the full launch sequence
    pub fn launch(&self, spec: &LaunchSpec) -> Result<LaunchResult, OrchestratorError> {
        spec.validate()?;
        // Reject before any side effect
        let volume_size = requested_size(spec.volume_size_gb)?;

        let resources =
            resolve_resources(self.control_plane, &spec.image, &spec.flavor, &spec.network)?;

        let run_id = RunId::generate();
        let destinations =
            ObjectDestinations::for_run(&self.object_container, &spec.job_name, run_id.as_str());
        info!(job = %spec.job_name, run_id = %run_id, "launching");

        let volume = match volume_size {
            Some(size_gb) => {
                let name = spec
                    .volume_name
                    .clone()
                    .unwrap_or_else(|| default_volume_name(&spec.job_name));
                Some(provision_volume(
                    self.control_plane,
                    &name,
                    size_gb,
                    &self.volume_policy,
                    &self.interrupt,
                )?)
            }
            None => None,
        };

        let result = self.boot(spec, &resources, &run_id, destinations, volume.as_ref());
        if let (Err(e), Some(volume)) = (&result, &volume) {
            if !matches!(e, OrchestratorError::ProvisioningFailed { kind: ResourceKind::Volume, .. }) {
                warn!(
                    volume = %volume.id(),
                    error = %e,
                    "launch failed after the data volume was created; it was left in place"
                );
            }
        }
        result
    }

    /// Steps after the volume exists: payload, instance, wait, state write
    fn boot(
        &self,
        spec: &LaunchSpec,
        resources: &ResolvedResources,
        run_id: &RunId,
        destinations: ObjectDestinations,
        volume: Option<&VolumeDescriptor>,
    ) -> Result<LaunchResult, OrchestratorError> {
        let user_data = self
            .payload
            .build(&spec.job_name, run_id.as_str(), &destinations)?;

        if self.interrupt.is_set() {
            let (kind, id) = match volume {
                Some(v) => (ResourceKind::Volume, v.id().to_string()),
                None => (ResourceKind::Job, spec.job_name.clone()),
            };
            return Err(OrchestratorError::Interrupted { kind, id });
        }

        let request = InstanceRequest {
            name: spec.instance_name(run_id),
            image_id: resources.image.id.clone(),
            flavor_id: resources.flavor.id.clone(),
            network_id: resources.network.id.clone(),
            user_data,
            key_name: spec.key_name.clone(),
            security_group: spec.security_group.clone(),
            volume: volume.map(|v| v.attachment.clone()),
        };
        let instance = self.control_plane.create_instance(&request)?;
        info!(server = %instance.id, name = %instance.name, "created instance, waiting for ACTIVE");

        let pending = format!("server {}", instance.id);
        self.interrupt.state().register_pending(&pending);
        let waited =
            self.control_plane
                .wait_for_instance_running(&instance, &self.instance_policy, &self.interrupt);
        self.interrupt.state().unregister_pending(&pending);
        let running = waited
            .map_err(|e| OrchestratorError::from_wait(ResourceKind::Server, &instance.id, e))?;

        let record = RemoteRecord {
            cloud: spec.cloud.clone(),
            server_id: Some(running.id.clone()),
            server_name: Some(running.name.clone()),
            run_id: Some(run_id.clone()),
            volume_id: volume.map(|v| v.id().to_string()),
            image: Some(spec.image.clone()),
            flavor: Some(spec.flavor.clone()),
            network: Some(spec.network.clone()),
            swift: Some(destinations.clone()),
        };
        if let Err(e) = self
            .store
            .write(&spec.job_name, &JobState::remote_running(&spec.job_name, record))
        {
            warn!(server = %running.id, "instance is running but its state record could not be written");
            return Err(e.into());
        }
        info!(job = %spec.job_name, server = %running.id, "instance is ACTIVE");

        Ok(LaunchResult {
            server_id: running.id,
            server_name: running.name,
            run_id: run_id.clone(),
            volume_id: volume.map(|v| v.id().to_string()),
            destinations,
        })
    }
}
