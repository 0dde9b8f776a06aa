use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use std::path::Path;

use super::{ReleaseSource, file_name_from_remote_path};
use crate::download::download_file;
use crate::error::StoreError;
use crate::http::{HttpClient, expect_status};
use crate::model::{ComponentLock, ComponentSpec, LocalLock, StoreConfig, parse_version};
use crate::template::{PathTemplate, TemplateField};

#[derive(Debug, Default, Deserialize)]
struct Checksums {
    #[serde(default)]
    sha1: String,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(default)]
    checksums: Checksums,
}

#[derive(Debug, Deserialize)]
struct FolderChild {
    uri: String,
    #[serde(default)]
    folder: bool,
}

#[derive(Debug, Deserialize)]
struct FolderInfo {
    #[serde(default)]
    children: Vec<FolderChild>,
}

/// Releases kept in an Artifactory repository, located by a path template.
pub struct ArtifactorySource {
    config: StoreConfig,
    http: HttpClient,
    template: PathTemplate,
    host: String,
}

impl ArtifactorySource {
    pub fn new(config: StoreConfig, http: HttpClient) -> Result<Self> {
        if config.artifactory_host.is_empty() {
            return Err(StoreError::Configuration(
                "artifactory release source requires artifactory_host".into(),
            )
            .into());
        }
        let template = PathTemplate::parse(&config.path_template).map_err(StoreError::from)?;
        let host = config.artifactory_host.trim_end_matches('/').to_string();
        Ok(Self {
            config,
            http,
            template,
            host,
        })
    }

    fn id(&self) -> String {
        self.config.effective_id()
    }

    fn storage_url(&self, path: &str) -> String {
        format!(
            "{}/api/storage/{}/{}",
            self.host,
            self.config.repo,
            path.trim_start_matches('/')
        )
    }

    fn artifact_url(&self, path: &str) -> String {
        let base = if self.host.ends_with("/artifactory") {
            self.host.clone()
        } else {
            format!("{}/artifactory", self.host)
        };
        format!("{}/{}/{}", base, self.config.repo, path.trim_start_matches('/'))
    }

    fn authorized(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.http.inner().request(method, url);
        if self.config.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.config.username, Some(&self.config.password))
        }
    }

    async fn file_info(&self, path: &str) -> Result<Option<FileInfo>> {
        let url = self.storage_url(path);
        match self.http.send_optional(self.authorized(Method::GET, &url)).await? {
            Some(response) => Ok(Some(
                response
                    .json::<FileInfo>()
                    .await
                    .with_context(|| format!("json from {} is malformed", url))?,
            )),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ReleaseSource for ArtifactorySource {
    fn configuration(&self) -> &StoreConfig {
        &self.config
    }

    #[tracing::instrument(skip(self))]
    async fn get_matched_release(&self, spec: &ComponentSpec) -> Result<Option<ComponentLock>> {
        let remote_path = self.remote_path(spec)?;
        let Some(info) = self.file_info(&remote_path).await? else {
            return Ok(None);
        };
        Ok(Some(
            spec.lock()
                .with_remote(self.id(), remote_path)
                .with_sha1(info.checksums.sha1),
        ))
    }

    #[tracing::instrument(skip(self))]
    async fn find_release_version(
        &self,
        spec: &ComponentSpec,
        _no_download: bool,
    ) -> Result<Option<ComponentLock>> {
        let constraint = spec.version_constraint()?;
        let remote_path = self.remote_path(spec)?;
        let dir = remote_path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or("");

        let url = self.storage_url(dir);
        let Some(response) = self
            .http
            .send_optional(self.authorized(Method::GET, &url))
            .await?
        else {
            return Ok(None);
        };
        let folder: FolderInfo = response
            .json()
            .await
            .with_context(|| format!("json from {} is malformed", url))?;

        let pattern = self
            .template
            .pattern(spec, &[TemplateField::Version, TemplateField::StemcellVersion])
            .map_err(StoreError::from)?;

        let mut best: Option<(semver::Version, ComponentLock)> = None;
        for child in folder.children.iter().filter(|c| !c.folder) {
            let path = format!("{}{}", dir, child.uri);
            let path = path.trim_start_matches('/');
            let Some(caps) = pattern.captures(path) else {
                debug!("{} does not match {}", path, self.template);
                continue;
            };
            if let Some(stemcell) = caps.name("stemcell_version") {
                if stemcell.as_str() != spec.stemcell_version {
                    continue;
                }
            }
            let Some(version) = caps.name("version").map(|m| m.as_str().to_string()) else {
                continue;
            };
            let Ok(parsed) = parse_version(&version) else {
                continue;
            };
            if !constraint.matches(&parsed) || best.as_ref().is_some_and(|(v, _)| *v >= parsed) {
                continue;
            }
            let mut lock = spec.lock().with_remote(self.id(), path);
            lock.version = version;
            best = Some((parsed, lock));
        }

        let Some((_, lock)) = best else {
            return Ok(None);
        };
        let info = self.file_info(&lock.remote_path).await?.ok_or_else(|| {
            anyhow::anyhow!("{} disappeared from artifactory while resolving", lock.remote_path)
        })?;
        Ok(Some(lock.with_sha1(info.checksums.sha1)))
    }

    #[tracing::instrument(skip(self))]
    async fn download_release(&self, dir: &Path, lock: &ComponentLock) -> Result<LocalLock> {
        info!(
            "downloading {} from {} release source {}",
            lock.name,
            self.config.kind,
            self.id()
        );
        let local_path = dir.join(file_name_from_remote_path(&lock.remote_path));
        let request = self.authorized(Method::GET, &self.artifact_url(&lock.remote_path));
        let sum = download_file(&self.http, request, &local_path)
            .await
            .with_context(|| format!("failed to download {} release from artifactory", lock.name))?;
        Ok(LocalLock {
            lock: lock.clone().with_sha1(sum),
            local_path,
        })
    }

    fn supports_upload(&self) -> bool {
        true
    }

    #[tracing::instrument(skip(self, content))]
    async fn upload_release(&self, spec: &ComponentSpec, content: Vec<u8>) -> Result<ComponentLock> {
        let remote_path = self.remote_path(spec)?;
        info!(
            "uploading release {:?} to {} at {:?}...",
            spec.name,
            self.id(),
            remote_path
        );
        let sum = crate::download::sha1_hex(&content);
        let request = self
            .authorized(Method::PUT, &self.artifact_url(&remote_path))
            .header("X-Checksum-Sha1", &sum)
            .body(content);
        let response = self.http.send_ok(request).await?;
        expect_status(&Method::PUT, &response, 201)?;

        Ok(spec.lock().with_remote(self.id(), remote_path).with_sha1(sum))
    }

    fn supports_remote_path(&self) -> bool {
        true
    }

    fn remote_path(&self, spec: &ComponentSpec) -> Result<String> {
        Ok(self.template.render(spec).map_err(StoreError::from)?)
    }
}
