//! Job state store
//!
//! Records live at `<state_dir>/<job name>.json`. Writes serialize with
//! RFC 8785 canonical JSON (sorted keys, no insignificant whitespace), so two
//! writes of the same logical state produce identical bytes. Each write goes
//! to a temp file in the same directory and is renamed over the target.
//!
//! There is no locking: concurrent writers for the same job name race and
//! the last rename wins.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::JobState;
use crate::job::{validate_job_name, JobSpecError};

/// File extension for state records
pub const STATE_FILE_EXTENSION: &str = "json";

/// Errors for state store operations
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt state record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode state record: {0}")]
    Encode(String),

    #[error("State record name '{record}' does not match key '{key}'")]
    NameMismatch { key: String, record: String },

    #[error(transparent)]
    InvalidName(#[from] JobSpecError),
}

/// Directory-backed store, one record per job name
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `job_name`
    pub fn path_for(&self, job_name: &str) -> Result<PathBuf, StateError> {
        validate_job_name(job_name)?;
        Ok(self
            .dir
            .join(format!("{}.{}", job_name, STATE_FILE_EXTENSION)))
    }

    /// Canonical bytes for a record
    pub fn encode(state: &JobState) -> Result<Vec<u8>, StateError> {
        let mut bytes = serde_json_canonicalizer::to_vec(state)
            .map_err(|e| StateError::Encode(e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Overwrite the record for `job_name`
    pub fn write(&self, job_name: &str, state: &JobState) -> Result<(), StateError> {
        if state.name != job_name {
            return Err(StateError::NameMismatch {
                key: job_name.to_string(),
                record: state.name.clone(),
            });
        }

        let path = self.path_for(job_name)?;
        let bytes = Self::encode(state)?;

        fs::create_dir_all(&self.dir).map_err(|source| StateError::Io {
            path: self.dir.clone(),
            source,
        })?;

        // Write to temp file first, then rename over the record
        let temp_path = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&temp_path, &bytes).map_err(|source| StateError::Io {
            path: temp_path.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StateError::Io { path, source });
        }

        debug!(job = job_name, status = %state.status, path = %path.display(), "wrote job state");
        Ok(())
    }

    /// Read the record for `job_name`; `Ok(None)` if none was ever written
    pub fn read(&self, job_name: &str) -> Result<Option<JobState>, StateError> {
        let path = self.path_for(job_name)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StateError::Io { path, source }),
        };

        let state = serde_json::from_slice(&bytes)
            .map_err(|source| StateError::Corrupt { path, source })?;
        Ok(Some(state))
    }

    /// Read, modify and rewrite an existing record.
    ///
    /// Returns `Ok(None)` without writing when no record exists.
    pub fn update<F>(&self, job_name: &str, f: F) -> Result<Option<JobState>, StateError>
    where
        F: FnOnce(&mut JobState),
    {
        let Some(mut state) = self.read(job_name)? else {
            return Ok(None);
        };
        f(&mut state);
        self.write(job_name, &state)?;
        Ok(Some(state))
    }
}
