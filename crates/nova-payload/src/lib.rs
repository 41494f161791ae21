//! Bootstrap payloads for nova-mlops
//!
//! Builds the cloud-init user-data handed to a freshly created instance.
//! The launch path treats the result as an opaque string; everything the
//! guest needs to know (job name, run id, where to upload results) is
//! passed in through [`PayloadBuilder::build`].

pub mod destinations;
pub mod error;
pub mod template;

pub use destinations::ObjectDestinations;
pub use error::PayloadError;
pub use template::CloudInitTemplate;

/// Nova rejects user-data larger than this many bytes.
pub const MAX_USER_DATA_BYTES: usize = 65_535;

/// Produces boot-time script content for a single run of a job.
pub trait PayloadBuilder: Send + Sync {
    /// Render the payload for `job_name` / `run_id`.
    ///
    /// Implementations must stay below [`MAX_USER_DATA_BYTES`].
    fn build(
        &self,
        job_name: &str,
        run_id: &str,
        destinations: &ObjectDestinations,
    ) -> Result<String, PayloadError>;
}

/// Reject payloads the compute service would refuse.
pub fn check_size(payload: &str) -> Result<(), PayloadError> {
    if payload.len() > MAX_USER_DATA_BYTES {
        return Err(PayloadError::TooLarge {
            size: payload.len(),
            limit: MAX_USER_DATA_BYTES,
        });
    }
    Ok(())
}
