use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use std::path::Path;

use super::{ReleaseSource, tarball_file_name};
use crate::download::download_file;
use crate::http::HttpClient;
use crate::model::{ComponentLock, ComponentSpec, LocalLock, StoreConfig, parse_version};

pub const DEFAULT_BOSH_IO_SERVER: &str = "https://bosh.io";

/// GitHub organisations whose releases bosh.io indexes, in lookup order.
pub const DEFAULT_PUBLISHERS: &[&str] = &[
    "cloudfoundry",
    "pivotal-cf",
    "cloudfoundry-incubator",
    "pivotal-cf-experimental",
    "bosh-packages",
    "cppforlife",
    "vito",
    "flavorjones",
    "xoebus",
    "dpb587",
    "jamlo",
    "concourse",
    "cf-platform-eng",
    "starkandwayne",
    "cloudfoundry-community",
    "vmware",
    "DataDog",
    "Dynatrace",
    "SAP",
    "hybris",
    "minio",
    "rakutentech",
    "frodenas",
];

/// Repository name suffixes tried after the release name, in lookup order.
pub const DEFAULT_SUFFIXES: &[&str] = &["-release", "-boshrelease", "-bosh-release", ""];

#[derive(Debug, Deserialize)]
struct BoshIoRelease {
    version: String,
    #[serde(default)]
    sha1: String,
}

/// Source releases published on bosh.io.
///
/// A release name is resolved by trying every publisher with every suffix,
/// e.g. `github.com/cloudfoundry/bpm-release`.
pub struct BoshIoSource {
    config: StoreConfig,
    http: HttpClient,
    server: String,
    publishers: Vec<String>,
    suffixes: Vec<String>,
}

impl BoshIoSource {
    pub fn new(config: StoreConfig, http: HttpClient) -> Self {
        let server = if config.endpoint.is_empty() {
            DEFAULT_BOSH_IO_SERVER.to_string()
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        Self {
            config,
            http,
            server,
            publishers: DEFAULT_PUBLISHERS.iter().map(|s| s.to_string()).collect(),
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replaces the publisher and suffix lists searched for each release.
    pub fn with_index(mut self, publishers: Vec<String>, suffixes: Vec<String>) -> Self {
        self.publishers = publishers;
        self.suffixes = suffixes;
        self
    }

    fn id(&self) -> String {
        self.config.effective_id()
    }

    /// `github.com/<org>/<repo>` names to try for a release, in order.
    fn candidates<'a>(&'a self, name: &'a str) -> impl Iterator<Item = String> + 'a {
        self.publishers.iter().flat_map(move |publisher| {
            self.suffixes
                .iter()
                .map(move |suffix| format!("github.com/{}/{}{}", publisher, name, suffix))
        })
    }

    /// Releases bosh.io knows for a repository; empty when it knows none.
    #[tracing::instrument(skip(self))]
    async fn get_releases(&self, full_name: &str) -> Result<Vec<BoshIoRelease>> {
        let url = format!("{}/api/v1/releases/{}", self.server, full_name);
        // bosh.io answers unknown repositories with either 404 or a literal `null`
        let releases: Option<Option<Vec<BoshIoRelease>>> = self
            .http
            .get_json_optional(&url)
            .await
            .with_context(|| format!("failed to query bosh.io for {}", full_name))?;
        Ok(releases.flatten().unwrap_or_default())
    }

    fn lock_for(&self, spec: &ComponentSpec, full_name: &str, release: &BoshIoRelease) -> ComponentLock {
        ComponentLock {
            name: spec.name.clone(),
            version: release.version.clone(),
            sha1: release.sha1.clone(),
            remote_source: self.id(),
            remote_path: format!("{}/d/{}?v={}", self.server, full_name, release.version),
            ..Default::default()
        }
    }
}

fn same_version(a: &str, b: &str) -> bool {
    match (parse_version(a), parse_version(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[async_trait]
impl ReleaseSource for BoshIoSource {
    fn configuration(&self) -> &StoreConfig {
        &self.config
    }

    #[tracing::instrument(skip(self))]
    async fn get_matched_release(&self, spec: &ComponentSpec) -> Result<Option<ComponentLock>> {
        let spec = spec.without_stemcell();
        for full_name in self.candidates(&spec.name) {
            let releases = self.get_releases(&full_name).await?;
            if let Some(release) = releases.iter().find(|r| same_version(&r.version, &spec.version)) {
                debug!("found {} {} at {}", spec.name, spec.version, full_name);
                return Ok(Some(self.lock_for(&spec, &full_name, release)));
            }
        }
        Ok(None)
    }

    #[tracing::instrument(skip(self))]
    async fn find_release_version(
        &self,
        spec: &ComponentSpec,
        _no_download: bool,
    ) -> Result<Option<ComponentLock>> {
        let spec = spec.without_stemcell();
        let constraint = spec.version_constraint()?;

        for full_name in self.candidates(&spec.name) {
            let releases = self.get_releases(&full_name).await?;
            // bosh.io lists versions newest first
            let satisfying = releases.iter().find(|r| {
                parse_version(&r.version)
                    .map(|v| constraint.matches(&v))
                    .unwrap_or(false)
            });
            if let Some(release) = satisfying {
                return Ok(Some(self.lock_for(&spec, &full_name, release)));
            }
        }
        Ok(None)
    }

    #[tracing::instrument(skip(self))]
    async fn download_release(&self, dir: &Path, lock: &ComponentLock) -> Result<LocalLock> {
        info!(
            "downloading {} from {} release source {}",
            lock.name,
            self.config.kind,
            self.id()
        );
        let local_path = dir.join(tarball_file_name(lock));
        let sum = download_file(&self.http, self.http.inner().get(&lock.remote_path), &local_path)
            .await
            .with_context(|| format!("failed to download {} from bosh.io", lock.name))?;
        Ok(LocalLock {
            lock: lock.clone().with_sha1(sum),
            local_path,
        })
    }
}
