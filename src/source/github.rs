//! Releases attached as `.tgz` assets to GitHub releases of an organisation.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::Path;
use url::Url;

use super::{ReleaseSource, tarball_file_name};
use crate::download::{Sha1Sink, sha1_file};
use crate::error::StoreError;
use crate::github::{GetReleases, GitHub, GitHubRepo, Release, ReleaseAsset};
use crate::http::HttpClient;
use crate::model::{
    CHECKSUM_NOT_CALCULATED, ComponentLock, ComponentSpec, LocalLock, StoreConfig, parse_version,
};

pub struct GitHubSource {
    config: StoreConfig,
    github: GitHub,
}

impl GitHubSource {
    /// `token` is used for every API call; the caller resolves it from the
    /// configuration or the environment.
    pub fn new(config: StoreConfig, http: HttpClient, token: Option<String>) -> Result<Self> {
        if config.org.is_empty() {
            return Err(StoreError::Configuration(
                "no github org passed for github release source".into(),
            )
            .into());
        }
        let api_url = Some(config.endpoint.clone()).filter(|e| !e.is_empty());
        let github = GitHub::new(http, api_url, token);
        Ok(Self { config, github })
    }

    fn id(&self) -> String {
        self.config.effective_id()
    }

    /// Repository of the spec when it belongs to the configured organisation.
    fn repository(&self, spec: &ComponentSpec) -> Option<GitHubRepo> {
        if spec.github_repository.is_empty() {
            return None;
        }
        let repo = match GitHubRepo::from_repository_url(&spec.github_repository) {
            Ok(repo) => repo,
            Err(e) => {
                debug!("ignoring github_repository of {}: {}", spec.name, e);
                return None;
            }
        };
        (repo.owner == self.config.org).then_some(repo)
    }

    /// Release for a version tagged either `v<version>` or `<version>`.
    async fn release_for_version(&self, repo: &GitHubRepo, version: &str) -> Result<Option<Release>> {
        let version = version.trim_start_matches('v');
        if let Some(release) = self
            .github
            .get_release_by_tag(repo, &format!("v{}", version))
            .await?
        {
            return Ok(Some(release));
        }
        self.github.get_release_by_tag(repo, version).await
    }

    async fn lock_from_release(
        &self,
        spec: &ComponentSpec,
        release: &Release,
        no_download: bool,
    ) -> Result<ComponentLock> {
        let version = release.tag_name.trim_start_matches('v').to_string();
        let asset = find_tarball(release, &spec.name, &version).ok_or_else(|| {
            anyhow!(
                "no matching GitHub release asset file name equal to {:?}",
                format!("{}-{}.tgz", spec.name, version)
            )
        })?;

        let sha1 = if no_download {
            CHECKSUM_NOT_CALCULATED.to_string()
        } else {
            let mut sink = Sha1Sink::new();
            self.github.download_asset(asset, &mut sink).await?;
            sink.hex_digest()
        };

        Ok(ComponentLock {
            name: spec.name.clone(),
            version,
            sha1,
            remote_source: self.id(),
            remote_path: asset.browser_download_url.clone(),
            ..Default::default()
        })
    }
}

/// Asset named `<name>-<version>.tgz`, or the `v`-prefixed variant some repositories publish.
fn find_tarball<'a>(release: &'a Release, name: &str, version: &str) -> Option<&'a ReleaseAsset> {
    let version = version.trim_start_matches('v');
    release
        .find_asset(&format!("{}-{}.tgz", name, version))
        .or_else(|| release.find_asset(&format!("{}-v{}.tgz", name, version)))
}

/// `owner/repo` from a `https://github.com/<owner>/<repo>/releases/download/...` URL.
fn repo_from_download_url(remote_path: &str) -> Result<GitHubRepo> {
    let url = Url::parse(remote_path)
        .with_context(|| format!("failed to parse remote_path {:?} as url", remote_path))?;
    let mut segments = url.path_segments().into_iter().flatten();
    match (segments.next(), segments.next()) {
        (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => Ok(GitHubRepo {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }),
        _ => bail!("remote_path {:?} does not name a repository", remote_path),
    }
}

#[async_trait]
impl ReleaseSource for GitHubSource {
    fn configuration(&self) -> &StoreConfig {
        &self.config
    }

    #[tracing::instrument(skip(self))]
    async fn get_matched_release(&self, spec: &ComponentSpec) -> Result<Option<ComponentLock>> {
        let Some(repo) = self.repository(spec) else {
            return Ok(None);
        };
        parse_version(&spec.version)
            .with_context(|| format!("expected version of {} to be an exact version", spec.name))?;

        match self.release_for_version(&repo, &spec.version).await? {
            Some(release) => Ok(Some(self.lock_from_release(spec, &release, false).await?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn find_release_version(
        &self,
        spec: &ComponentSpec,
        no_download: bool,
    ) -> Result<Option<ComponentLock>> {
        let Some(repo) = self.repository(spec) else {
            return Ok(None);
        };
        let constraint = spec.version_constraint()?;

        let releases = self.github.get_releases(&repo).await?;
        let best = releases
            .iter()
            .filter(|r| !r.draft)
            .filter_map(|r| parse_version(&r.tag_name).ok().map(|v| (v, r)))
            .filter(|(v, _)| constraint.matches(v))
            .max_by(|(a, _), (b, _)| a.cmp(b));

        match best {
            Some((_, release)) => {
                debug!("{} {} satisfies {}", repo, release.tag_name, constraint);
                Ok(Some(self.lock_from_release(spec, release, no_download).await?))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn download_release(&self, dir: &Path, lock: &ComponentLock) -> Result<LocalLock> {
        info!(
            "downloading {} from {} release source {}",
            lock.name,
            self.config.kind,
            self.id()
        );
        let repo = repo_from_download_url(&lock.remote_path)?;

        let release = match self.github.get_release_by_tag(&repo, &lock.version).await? {
            Some(release) => release,
            None => {
                warn!("failed to find release tag {}, trying v{}", lock.version, lock.version);
                self.github
                    .get_release_by_tag(&repo, &format!("v{}", lock.version))
                    .await?
                    .ok_or_else(|| anyhow!("can't find release tag {} in {}", lock.version, repo))?
            }
        };
        let asset = find_tarball(&release, &lock.name, &lock.version).ok_or_else(|| {
            anyhow!("failed to download file for release: expected release asset not found")
        })?;

        let local_path = dir.join(tarball_file_name(lock));
        let mut file = tokio::fs::File::create(&local_path)
            .await
            .with_context(|| format!("Failed to create file at {:?}", local_path))?;
        self.github.download_asset(asset, &mut file).await?;
        drop(file);

        let sum = sha1_file(&local_path).await?;
        Ok(LocalLock {
            lock: lock.clone().with_sha1(sum),
            local_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoreType;
    use reqwest::Client;
    use tempfile::tempdir;

    // sha1("abc")
    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    fn source(api_url: &str) -> GitHubSource {
        let config = StoreConfig {
            org: "cloudfoundry".into(),
            endpoint: api_url.to_string(),
            ..StoreConfig::new(StoreType::GitHub)
        };
        GitHubSource::new(config, HttpClient::new(Client::new()), Some("t0ken".into())).unwrap()
    }

    fn bpm(version: &str) -> ComponentSpec {
        ComponentSpec::new("bpm", version)
            .with_github_repository("https://github.com/cloudfoundry/bpm-release")
    }

    fn release_json(server_url: &str, tag: &str, asset: &str) -> String {
        format!(
            r#"{{"tag_name": "{tag}", "draft": false, "prerelease": false, "assets": [
                {{"name": "{asset}", "size": 3,
                  "url": "{server_url}/repos/cloudfoundry/bpm-release/releases/assets/1",
                  "browser_download_url": "{server_url}/cloudfoundry/bpm-release/releases/download/{tag}/{asset}"}}
            ]}}"#
        )
    }

    #[test]
    fn test_new_requires_org() {
        let config = StoreConfig::new(StoreType::GitHub);
        assert!(GitHubSource::new(config, HttpClient::new(Client::new()), None).is_err());
    }

    #[test]
    fn test_repository_must_belong_to_org() {
        let src = source("http://127.0.0.1:1");
        assert!(src.repository(&bpm("1.0.0")).is_some());
        assert!(src.repository(&ComponentSpec::new("bpm", "1.0.0")).is_none());
        let other = ComponentSpec::new("bpm", "1.0.0")
            .with_github_repository("git@github.com:someone-else/bpm-release.git");
        assert!(src.repository(&other).is_none());
    }

    #[test]
    fn test_repo_from_download_url() {
        let repo = repo_from_download_url(
            "https://github.com/cloudfoundry/bpm-release/releases/download/v1.2.3/bpm-1.2.3.tgz",
        )
        .unwrap();
        assert_eq!(repo.to_string(), "cloudfoundry/bpm-release");
        assert!(repo_from_download_url("https://github.com/").is_err());
    }

    #[tokio::test]
    async fn test_get_matched_release_falls_back_to_bare_tag() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();
        let v_tag = server
            .mock("GET", "/repos/cloudfoundry/bpm-release/releases/tags/v1.2.3")
            .with_status(404)
            .create_async()
            .await;
        let bare_tag = server
            .mock("GET", "/repos/cloudfoundry/bpm-release/releases/tags/1.2.3")
            .match_header("authorization", "Bearer t0ken")
            .with_status(200)
            .with_body(release_json(&url, "1.2.3", "bpm-v1.2.3.tgz"))
            .create_async()
            .await;
        let asset = server
            .mock("GET", "/repos/cloudfoundry/bpm-release/releases/assets/1")
            .match_header("accept", "application/octet-stream")
            .with_status(200)
            .with_body("abc")
            .create_async()
            .await;

        let lock = source(&url)
            .get_matched_release(&bpm("1.2.3"))
            .await
            .unwrap()
            .unwrap();

        v_tag.assert_async().await;
        bare_tag.assert_async().await;
        asset.assert_async().await;
        assert_eq!(lock.version, "1.2.3");
        assert_eq!(lock.sha1, ABC_SHA1);
        assert_eq!(lock.remote_source, "cloudfoundry");
        assert!(lock.remote_path.ends_with("/download/1.2.3/bpm-v1.2.3.tgz"));
    }

    #[tokio::test]
    async fn test_get_matched_release_missing_tag() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .expect(2)
            .create_async()
            .await;

        let result = source(&server.url())
            .get_matched_release(&bpm("1.2.3"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_find_release_version_picks_highest_satisfying() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();
        let body = format!(
            "[{}, {}, {}]",
            release_json(&url, "v2.0.0", "bpm-2.0.0.tgz"),
            release_json(&url, "v1.1.0", "bpm-1.1.0.tgz"),
            release_json(&url, "v1.0.0", "bpm-1.0.0.tgz"),
        );
        let list = server
            .mock("GET", "/repos/cloudfoundry/bpm-release/releases")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .expect_at_least(1)
            .create_async()
            .await;

        let lock = source(&url)
            .find_release_version(&bpm("~1"), true)
            .await
            .unwrap()
            .unwrap();

        list.assert_async().await;
        assert_eq!(lock.version, "1.1.0");
        assert_eq!(lock.sha1, CHECKSUM_NOT_CALCULATED);
    }

    #[tokio::test]
    async fn test_find_release_version_without_repository() {
        let src = source("http://127.0.0.1:1");
        let result = src
            .find_release_version(&ComponentSpec::new("bpm", "~1"), false)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_download_release() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();
        let _tag = server
            .mock("GET", "/repos/cloudfoundry/bpm-release/releases/tags/1.2.3")
            .with_status(404)
            .create_async()
            .await;
        let _v_tag = server
            .mock("GET", "/repos/cloudfoundry/bpm-release/releases/tags/v1.2.3")
            .with_status(200)
            .with_body(release_json(&url, "v1.2.3", "bpm-1.2.3.tgz"))
            .create_async()
            .await;
        let _asset = server
            .mock("GET", "/repos/cloudfoundry/bpm-release/releases/assets/1")
            .with_status(200)
            .with_body("abc")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let lock = ComponentLock {
            name: "bpm".into(),
            version: "1.2.3".into(),
            remote_source: "cloudfoundry".into(),
            remote_path: format!(
                "{}/cloudfoundry/bpm-release/releases/download/v1.2.3/bpm-1.2.3.tgz",
                url
            ),
            ..Default::default()
        };
        let local = source(&url).download_release(dir.path(), &lock).await.unwrap();

        assert_eq!(local.local_path, dir.path().join("bpm-1.2.3.tgz"));
        assert_eq!(local.lock.sha1, ABC_SHA1);
        assert_eq!(std::fs::read(&local.local_path).unwrap(), b"abc");
    }
}
