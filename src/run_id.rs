//! Run identifiers
//!
//! A run id is `<UTC timestamp>-<8 hex chars>`, e.g. `20261018T093012Z-9f2c01ab`.
//! The timestamp prefix makes ids sort by launch time; the 32-bit random
//! suffix makes collisions within one job's lifetime practically impossible.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// strftime layout of the timestamp prefix
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Opaque, time-ordered identifier for one launch attempt
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh id from the system clock and thread RNG.
    pub fn generate() -> Self {
        Self::from_parts(Utc::now(), rand::random::<u32>())
    }

    /// Build an id from an explicit instant and entropy value.
    pub fn from_parts(at: DateTime<Utc>, entropy: u32) -> Self {
        Self(format!("{}-{:08x}", at.format(TIMESTAMP_FORMAT), entropy))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
