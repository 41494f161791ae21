//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// State directory (default: ".nova-mlops/state")
    pub state_dir: String,

    /// Image name used when a launch does not name one
    pub image: String,

    /// Flavor name used when a launch does not name one
    pub flavor: String,

    /// Network name used when a launch does not name one
    pub network: String,

    /// Data volume size in GB (default: 0 = no volume)
    pub volume_size_gb: i64,

    /// Object-storage container for results/manifests/logs
    pub object_container: String,

    /// Executable driven by the production control plane
    pub cli: String,

    pub poll_interval_seconds: u64,

    pub volume_timeout_seconds: u64,

    pub instance_timeout_seconds: u64,

    /// Bootstrap payload template (default: "nlp")
    pub payload_template: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            state_dir: ".nova-mlops/state".to_string(),
            image: "ubuntu-22.04".to_string(),
            flavor: "m1.small".to_string(),
            network: "private".to_string(),
            volume_size_gb: 0,
            object_container: "mlops-artifacts".to_string(),
            cli: "openstack".to_string(),
            poll_interval_seconds: 2,
            volume_timeout_seconds: 600,
            instance_timeout_seconds: 600,
            payload_template: "nlp".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "state_dir": self.state_dir,
            "openstack": {
                "image": self.image,
                "flavor": self.flavor,
                "network": self.network,
                "volume_size_gb": self.volume_size_gb,
                "object_container": self.object_container,
                "cli": self.cli
            },
            "wait": {
                "poll_interval_seconds": self.poll_interval_seconds,
                "volume_timeout_seconds": self.volume_timeout_seconds,
                "instance_timeout_seconds": self.instance_timeout_seconds
            },
            "payload": {
                "template": self.payload_template
            }
        })
    }
}
