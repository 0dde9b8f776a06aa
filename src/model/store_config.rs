use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend kind of a configured release source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StoreType {
    #[default]
    #[serde(rename = "s3")]
    S3,
    #[serde(rename = "bosh.io")]
    BoshIo,
    #[serde(rename = "artifactory")]
    Artifactory,
    #[serde(rename = "github")]
    GitHub,
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::S3 => "s3",
            StoreType::BoshIo => "bosh.io",
            StoreType::Artifactory => "artifactory",
            StoreType::GitHub => "github",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StoreType::S3),
            "bosh.io" => Ok(StoreType::BoshIo),
            "artifactory" => Ok(StoreType::Artifactory),
            "github" => Ok(StoreType::GitHub),
            _ => anyhow::bail!(
                "Unknown release source type: {}. Expected s3, bosh.io, artifactory, or github.",
                s
            ),
        }
    }
}

/// One entry of `release_sources` in the spec file.
///
/// The structure is flat; which fields are meaningful depends on `type`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(rename = "type")]
    pub kind: StoreType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub publishable: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_template: String,

    /// Base URL override: S3 endpoint, bosh.io server or GitHub API URL.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    // s3
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_key_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_access_key: String,

    // github
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub github_token: String,

    // artifactory
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artifactory_host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

impl StoreConfig {
    pub fn new(kind: StoreType) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// The explicit id, when one is configured and non-empty.
    pub fn explicit_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// The id used to reference this source from lock files.
    ///
    /// Falls back to the bucket (S3), the org (GitHub), or the type name.
    pub fn effective_id(&self) -> String {
        if let Some(id) = self.explicit_id() {
            return id.to_string();
        }
        match self.kind {
            StoreType::S3 => self.bucket.clone(),
            StoreType::GitHub => self.org.clone(),
            StoreType::BoshIo | StoreType::Artifactory => self.kind.as_str().to_string(),
        }
    }

    /// Whether a lock's `remote_source` refers to this source.
    ///
    /// An explicit id must match exactly; sources without one also answer to their type name.
    pub fn answers_to(&self, remote_source: &str) -> bool {
        match self.explicit_id() {
            Some(id) => id == remote_source,
            None => self.effective_id() == remote_source || self.kind.as_str() == remote_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_type_parse_and_display() {
        assert_eq!("s3".parse::<StoreType>().unwrap(), StoreType::S3);
        assert_eq!("BOSH.io".parse::<StoreType>().unwrap(), StoreType::BoshIo);
        assert_eq!(
            "artifactory".parse::<StoreType>().unwrap(),
            StoreType::Artifactory
        );
        assert_eq!("github".parse::<StoreType>().unwrap(), StoreType::GitHub);
        assert!("ftp".parse::<StoreType>().is_err());
        assert_eq!(StoreType::BoshIo.to_string(), "bosh.io");
    }

    #[test]
    fn test_effective_id_defaults() {
        let mut s3 = StoreConfig::new(StoreType::S3);
        s3.bucket = "compiled-releases".into();
        assert_eq!(s3.effective_id(), "compiled-releases");

        let mut gh = StoreConfig::new(StoreType::GitHub);
        gh.org = "cloudfoundry".into();
        assert_eq!(gh.effective_id(), "cloudfoundry");

        assert_eq!(StoreConfig::new(StoreType::BoshIo).effective_id(), "bosh.io");
        assert_eq!(
            StoreConfig::new(StoreType::Artifactory).effective_id(),
            "artifactory"
        );
    }

    #[test]
    fn test_explicit_id_wins() {
        let mut s3 = StoreConfig::new(StoreType::S3);
        s3.bucket = "compiled-releases".into();
        s3.id = Some("comp".into());
        assert_eq!(s3.effective_id(), "comp");
        assert!(s3.answers_to("comp"));
        assert!(!s3.answers_to("compiled-releases"));
        assert!(!s3.answers_to("s3"));
    }

    #[test]
    fn test_empty_id_is_treated_as_unset() {
        let mut s3 = StoreConfig::new(StoreType::S3);
        s3.bucket = "built-releases".into();
        s3.id = Some(String::new());
        assert_eq!(s3.effective_id(), "built-releases");
        assert!(s3.answers_to("built-releases"));
        assert!(s3.answers_to("s3"));
    }

    #[test]
    fn test_yaml_deserialize() {
        let config: StoreConfig = serde_yaml::from_str(
            "type: s3\nbucket: compiled-releases\nregion: us-west-1\npublishable: true\npath_template: \"{{.Name}}-{{.Version}}.tgz\"\n",
        )
        .unwrap();
        assert_eq!(config.kind, StoreType::S3);
        assert!(config.publishable);
        assert_eq!(config.path_template, "{{.Name}}-{{.Version}}.tgz");
        assert_eq!(config.id, None);
    }

    #[test]
    fn test_yaml_unknown_type_is_rejected() {
        let result: Result<StoreConfig, _> = serde_yaml::from_str("type: ftp\n");
        assert!(result.is_err());
    }
}
