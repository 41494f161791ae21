//! JobSpec model and loading
//!
//! A job file declares the job name, its execution target, the entrypoint
//! and where artifacts go. Files ending in `.json` are parsed as JSON,
//! `.yaml`/`.yml` as YAML, everything else as TOML. A loaded JobSpec is
//! never mutated.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Execution target for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Subprocess on this machine
    #[default]
    Local,
    /// Nova instance on an OpenStack cloud
    Openstack,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => write!(f, "local"),
            Backend::Openstack => write!(f, "openstack"),
        }
    }
}

impl FromStr for Backend {
    type Err = JobSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Backend::Local),
            "openstack" => Ok(Backend::Openstack),
            _ => Err(JobSpecError::InvalidBackend(s.to_string())),
        }
    }
}

/// Resource requirements (`[resources]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Resources {
    /// Execution target (default: local)
    #[serde(default)]
    pub cloud: Backend,

    /// Flavor name
    #[serde(default)]
    pub flavor: Option<String>,

    /// Image name
    #[serde(default)]
    pub image: Option<String>,

    /// Tenant network name
    #[serde(default)]
    pub network: Option<String>,

    /// Security group applied to the instance
    #[serde(default)]
    pub security_group: Option<String>,

    /// Data volume size in GB; zero or negative means no volume
    #[serde(default)]
    pub volume_gb: Option<i64>,

    /// Keypair injected into the instance
    #[serde(default)]
    pub keypair: Option<String>,
}

/// What to execute (`[run]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Command line, split on whitespace
    pub entrypoint: String,

    /// Extra arguments, flattened to `--key value` in declaration order
    #[serde(default)]
    pub args: IndexMap<String, serde_json::Value>,
}

/// Artifact placement (`[artifacts]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Root directory; each job writes to `<output_dir>/<name>`
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ArtifactSpec {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

/// Declared job description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique job name, also the state-store key
    pub name: String,

    #[serde(default)]
    pub resources: Resources,

    pub run: RunSpec,

    #[serde(default)]
    pub artifacts: ArtifactSpec,
}

/// Errors while loading or validating a JobSpec
#[derive(Debug, Error)]
pub enum JobSpecError {
    #[error("Failed to read job file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML job file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON job file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML job file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid job name '{0}': use letters, digits, '.', '_' or '-', starting with a letter or digit")]
    InvalidName(String),

    #[error("Job '{0}' has an empty entrypoint")]
    EmptyEntrypoint(String),

    #[error("Invalid backend '{0}' (expected: local, openstack)")]
    InvalidBackend(String),
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("job name pattern is valid")
    })
}

/// Check that `name` is usable as a state-file name and remote resource name.
pub fn validate_job_name(name: &str) -> Result<(), JobSpecError> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(JobSpecError::InvalidName(name.to_string()))
    }
}

impl JobSpec {
    /// Load a job file, choosing the format from the extension.
    pub fn from_file(path: &Path) -> Result<Self, JobSpecError> {
        let content = fs::read_to_string(path).map_err(|source| JobSpecError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Self::from_json(&content),
            "yaml" | "yml" => Self::from_yaml(&content),
            _ => Self::from_toml(&content),
        }
    }

    /// Parse and validate a TOML job description
    pub fn from_toml(content: &str) -> Result<Self, JobSpecError> {
        let spec: JobSpec = toml::from_str(content)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse and validate a JSON job description
    pub fn from_json(content: &str) -> Result<Self, JobSpecError> {
        let spec: JobSpec = serde_json::from_str(content)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse and validate a YAML job description
    pub fn from_yaml(content: &str) -> Result<Self, JobSpecError> {
        let spec: JobSpec = serde_yaml::from_str(content)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Validate name and entrypoint
    pub fn validate(&self) -> Result<(), JobSpecError> {
        validate_job_name(&self.name)?;
        if self.run.entrypoint.split_whitespace().next().is_none() {
            return Err(JobSpecError::EmptyEntrypoint(self.name.clone()));
        }
        Ok(())
    }

    /// Job-specific artifact directory (`<output_dir>/<name>`)
    pub fn artifact_dir(&self) -> PathBuf {
        self.artifacts.output_dir.join(&self.name)
    }
}
