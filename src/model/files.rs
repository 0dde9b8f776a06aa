use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{ComponentLock, ComponentSpec, StoreConfig};

/// Platform requirement shared by every release in a tile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StemcellCriteria {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub version: String,
}

/// The declared requirements: where releases may come from and which ones are needed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Specfile {
    #[serde(default)]
    pub release_sources: Vec<StoreConfig>,
    #[serde(default)]
    pub releases: Vec<ComponentSpec>,
    #[serde(default)]
    pub stemcell_criteria: StemcellCriteria,
}

impl Specfile {
    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read spec file {:?}", path))?;
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse spec file {:?}", path))
    }

    pub fn component_spec(&self, name: &str) -> Option<&ComponentSpec> {
        self.releases.iter().find(|spec| spec.name == name)
    }
}

/// The resolved state of every release, rewritten wholesale after resolution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    pub releases: Vec<ComponentLock>,
    #[serde(default)]
    pub stemcell_criteria: StemcellCriteria,
}

impl Lockfile {
    #[tracing::instrument]
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lock file {:?}", path))?;
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse lock file {:?}", path))
    }

    #[tracing::instrument(skip(self))]
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize lock file")?;
        std::fs::write(path, content).with_context(|| format!("Failed to write lock file {:?}", path))
    }

    pub fn find_release(&self, name: &str) -> Option<&ComponentLock> {
        self.releases.iter().find(|lock| lock.name == name)
    }

    /// Replaces the lock with the same name, or appends it.
    pub fn update_release(&mut self, lock: ComponentLock) {
        match self.releases.iter_mut().find(|r| r.name == lock.name) {
            Some(existing) => *existing = lock,
            None => self.releases.push(lock),
        }
    }
}
