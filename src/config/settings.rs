//! Typed view of the merged configuration

use std::path::PathBuf;

use nova_payload::CloudInitTemplate;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::wait::WaitPolicy;

/// Settings for the remote backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenStackSettings {
    /// clouds.yaml entry; `None` authenticates from `OS_*` variables
    #[serde(default)]
    pub cloud: Option<String>,
    pub image: String,
    pub flavor: String,
    pub network: String,
    pub volume_size_gb: i64,
    pub object_container: String,
    pub cli: String,
}

/// Poll interval and wait budgets, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSettings {
    pub poll_interval_seconds: u64,
    pub volume_timeout_seconds: u64,
    pub instance_timeout_seconds: u64,
}

impl WaitSettings {
    pub fn volume_policy(&self) -> Result<WaitPolicy, ConfigError> {
        WaitPolicy::from_seconds(self.poll_interval_seconds, self.volume_timeout_seconds)
            .map_err(|e| ConfigError::ValidationError(format!("wait.volume_timeout: {}", e)))
    }

    pub fn instance_policy(&self) -> Result<WaitPolicy, ConfigError> {
        WaitPolicy::from_seconds(self.poll_interval_seconds, self.instance_timeout_seconds)
            .map_err(|e| ConfigError::ValidationError(format!("wait.instance_timeout: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSettings {
    pub template: String,
}

impl PayloadSettings {
    pub fn template(&self) -> Result<CloudInitTemplate, ConfigError> {
        self.template
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("payload.template: {}", e)))
    }
}

/// Fully merged settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub openstack: OpenStackSettings,
    pub wait: WaitSettings,
    pub payload: PayloadSettings,
}

impl Settings {
    /// Check every value that has bounds beyond its type
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "state_dir must not be empty".to_string(),
            ));
        }
        for (key, value) in [
            ("openstack.image", &self.openstack.image),
            ("openstack.flavor", &self.openstack.flavor),
            ("openstack.network", &self.openstack.network),
            ("openstack.object_container", &self.openstack.object_container),
            ("openstack.cli", &self.openstack.cli),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} must not be empty",
                    key
                )));
            }
        }
        self.wait.volume_policy()?;
        self.wait.instance_policy()?;
        self.payload.template()?;
        Ok(())
    }
}
