//! Profile fingerprints
//!
//! A SHA256 digest over the canonical JSON of a color usage profile, so a
//! saved plan can be matched to the print it was computed for.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::Result;
use crate::model::ColorUsageProfile;

/// SHA256 fingerprint of a profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileFingerprint(String);

impl ProfileFingerprint {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(data)))
    }

    /// Fingerprint a profile. Struct fields serialize in declaration order
    /// and the layer map is ordered, so equal profiles hash equally.
    pub fn of(profile: &ColorUsageProfile) -> Result<Self> {
        let canonical = serde_json::to_vec(profile)?;
        Ok(Self::from_bytes(&canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines and file names
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }

    /// Whether `profile` still matches this fingerprint
    pub fn verify(&self, profile: &ColorUsageProfile) -> Result<bool> {
        Ok(Self::of(profile)? == *self)
    }
}

impl fmt::Display for ProfileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProfileFingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}
