use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ComponentLock;
use super::version::VersionConstraint;

/// A declared requirement for one release.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Release name; required.
    pub name: String,

    /// Version constraint. Empty means any version (`>0`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Stemcell OS the release must be compiled against, if any.
    #[serde(rename = "os", default, skip_serializing_if = "String::is_empty")]
    pub stemcell_os: String,

    /// Stemcell version the release must be compiled against, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stemcell_version: String,

    /// Repository hosting the release source code.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub github_repository: String,
}

impl ComponentSpec {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_stemcell(mut self, os: impl Into<String>, version: impl Into<String>) -> Self {
        self.stemcell_os = os.into();
        self.stemcell_version = version.into();
        self
    }

    pub fn with_github_repository(mut self, repository: impl Into<String>) -> Self {
        self.github_repository = repository.into();
        self
    }

    pub fn version_constraint(&self) -> Result<VersionConstraint> {
        VersionConstraint::parse(&self.version)
            .with_context(|| format!("expected version of {} to be a constraint", self.name))
    }

    /// A lock carrying only what the spec already knows.
    pub fn lock(&self) -> ComponentLock {
        ComponentLock {
            name: self.name.clone(),
            version: self.version.clone(),
            stemcell_os: self.stemcell_os.clone(),
            stemcell_version: self.stemcell_version.clone(),
            ..Default::default()
        }
    }

    pub fn without_stemcell(&self) -> Self {
        Self {
            stemcell_os: String::new(),
            stemcell_version: String::new(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.version.is_empty() {
            write!(f, "@{}", self.version)?;
        }
        if !self.stemcell_os.is_empty() || !self.stemcell_version.is_empty() {
            write!(f, " ({} {})", self.stemcell_os, self.stemcell_version)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_yaml_field_names() {
        let spec: ComponentSpec = serde_yaml::from_str(
            "name: bpm\nversion: ~1.1\nos: ubuntu-jammy\nstemcell_version: \"1.44\"\ngithub_repository: https://github.com/cloudfoundry/bpm-release\n",
        )
        .unwrap();
        assert_eq!(spec.name, "bpm");
        assert_eq!(spec.version, "~1.1");
        assert_eq!(spec.stemcell_os, "ubuntu-jammy");
        assert_eq!(spec.stemcell_version, "1.44");
        assert_eq!(
            spec.github_repository,
            "https://github.com/cloudfoundry/bpm-release"
        );
    }

    #[test]
    fn test_spec_lock_copies_known_fields() {
        let spec = ComponentSpec::new("bpm", "1.2.3").with_stemcell("ubuntu-jammy", "1.44");
        let lock = spec.lock();
        assert_eq!(lock.name, "bpm");
        assert_eq!(lock.version, "1.2.3");
        assert_eq!(lock.stemcell_os, "ubuntu-jammy");
        assert!(lock.sha1.is_empty());
        assert!(lock.remote_source.is_empty());
    }

    #[test]
    fn test_without_stemcell() {
        let spec = ComponentSpec::new("bpm", "1.2.3").with_stemcell("ubuntu-jammy", "1.44");
        let bare = spec.without_stemcell();
        assert!(bare.stemcell_os.is_empty());
        assert!(bare.stemcell_version.is_empty());
        assert_eq!(bare.version, "1.2.3");
    }

    #[test]
    fn test_invalid_constraint_names_release() {
        let spec = ComponentSpec::new("bpm", "one point two");
        let err = spec.version_constraint().unwrap_err();
        assert!(err.to_string().contains("bpm"));
    }

    #[test]
    fn test_display() {
        let spec = ComponentSpec::new("bpm", "~1").with_stemcell("ubuntu-jammy", "1.44");
        assert_eq!(spec.to_string(), "bpm@~1 (ubuntu-jammy 1.44)");
    }
}
