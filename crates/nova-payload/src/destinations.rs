//! Object-storage destinations for one run.

use serde::{Deserialize, Serialize};

/// Where the guest uploads its outputs.
///
/// All three object names are namespaced by job name and run id so that
/// repeated launches of the same job never overwrite each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDestinations {
    /// Object-storage container
    pub container: String,
    /// Results document, e.g. `results/<job>/<run>/results.json`
    pub results_object: String,
    /// Run manifest, e.g. `manifests/<job>/<run>.json`
    pub manifest_object: String,
    /// Guest log, e.g. `logs/<job>/<run>.log`
    pub log_object: String,
}

impl ObjectDestinations {
    /// Derive the destination triple for `job_name` / `run_id` under `container`.
    pub fn for_run(container: &str, job_name: &str, run_id: &str) -> Self {
        Self {
            container: container.to_string(),
            results_object: format!("results/{}/{}/results.json", job_name, run_id),
            manifest_object: format!("manifests/{}/{}.json", job_name, run_id),
            log_object: format!("logs/{}/{}.log", job_name, run_id),
        }
    }
}
