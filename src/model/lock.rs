use anyhow::Result;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::ComponentSpec;
use super::version::parse_version;

/// Checksum recorded when a release was resolved without downloading it.
pub const CHECKSUM_NOT_CALCULATED: &str = "not-calculated";

/// An exact build of a release at one remote location.
///
/// All fields are plain strings so the lock can be used as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ComponentLock {
    pub name: String,

    #[serde(default)]
    pub sha1: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(rename = "os", default, skip_serializing_if = "String::is_empty")]
    pub stemcell_os: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stemcell_version: String,

    #[serde(default)]
    pub remote_source: String,

    #[serde(default)]
    pub remote_path: String,
}

impl ComponentLock {
    pub fn with_sha1(mut self, sum: impl Into<String>) -> Self {
        self.sha1 = sum.into();
        self
    }

    pub fn with_remote(mut self, source: impl Into<String>, path: impl Into<String>) -> Self {
        self.remote_source = source.into();
        self.remote_path = path.into();
        self
    }

    pub fn parse_version(&self) -> Result<Version> {
        parse_version(&self.version)
    }

    /// Whether the checksum is a real digest rather than empty or a placeholder.
    pub fn has_checksum(&self) -> bool {
        !self.sha1.is_empty() && self.sha1 != CHECKSUM_NOT_CALCULATED
    }

    pub fn spec(&self) -> ComponentSpec {
        ComponentSpec {
            name: self.name.clone(),
            version: self.version.clone(),
            stemcell_os: self.stemcell_os.clone(),
            stemcell_version: self.stemcell_version.clone(),
            github_repository: String::new(),
        }
    }
}

impl fmt::Display for ComponentLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)?;
        if self.has_checksum() {
            let short: String = self.sha1.chars().take(8).collect();
            write!(f, " {}", short)?;
        }
        for part in [
            &self.stemcell_os,
            &self.stemcell_version,
            &self.remote_source,
            &self.remote_path,
        ] {
            if !part.is_empty() {
                write!(f, " {}", part)?;
            }
        }
        Ok(())
    }
}

/// A lock whose artifact has been written to the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalLock {
    pub lock: ComponentLock,
    pub local_path: PathBuf,
}
