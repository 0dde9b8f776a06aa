use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::RequestBuilder;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tokio::io::AsyncWrite;

use crate::http::HttpClient;

use super::repo::GitHubRepo;
use super::types::{Release, ReleaseAsset};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 10;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GetReleases: Send + Sync {
    /// Looks up a release by tag; `None` when the tag has no release.
    async fn get_release_by_tag(&self, repo: &GitHubRepo, tag: &str) -> Result<Option<Release>>;
    async fn get_releases(&self, repo: &GitHubRepo) -> Result<Vec<Release>>;
    fn api_url(&self) -> &str;
}

pub struct GitHub {
    pub http: HttpClient,
    pub api_url: String,
    token: Option<String>,
}

impl GitHub {
    #[tracing::instrument(skip(http, api_url, token))]
    pub fn new(http: HttpClient, api_url: Option<String>, token: Option<String>) -> Self {
        let api_url = api_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let token = token.filter(|t| !t.is_empty());
        Self {
            http,
            api_url,
            token,
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Streams a release asset's bytes into `writer`.
    #[tracing::instrument(skip(self, writer))]
    pub async fn download_asset<W>(&self, asset: &ReleaseAsset, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let url = if asset.url.is_empty() {
            &asset.browser_download_url
        } else {
            &asset.url
        };
        debug!("Downloading asset {} from {}...", asset.name, url);
        let request = self
            .authorize(self.http.inner().get(url))
            .header(ACCEPT, "application/octet-stream");
        self.http
            .download_to(request, writer)
            .await
            .with_context(|| format!("Failed to download release asset {}", asset.name))
    }
}

#[async_trait]
impl GetReleases for GitHub {
    #[tracing::instrument(skip(self, repo))]
    async fn get_release_by_tag(&self, repo: &GitHubRepo, tag: &str) -> Result<Option<Release>> {
        let url = format!(
            "{}/repos/{}/{}/releases/tags/{}",
            self.api_url, repo.owner, repo.repo, tag
        );
        debug!("Fetching release {} from {}...", tag, url);

        let request = self.authorize(self.http.inner().get(&url));
        match self.http.send_optional(request).await? {
            Some(response) => {
                let release = response
                    .json::<Release>()
                    .await
                    .context("Failed to parse JSON response from GitHub API")?;
                Ok(Some(release))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self, repo))]
    async fn get_releases(&self, repo: &GitHubRepo) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        let mut page = 1;

        // Limit to 10 pages (1000 releases) to prevent an endless loop
        while page <= MAX_PAGES {
            let url = format!("{}/repos/{}/{}/releases", self.api_url, repo.owner, repo.repo);

            debug!("Fetching releases page {} from {}...", page, url);

            let request = self
                .authorize(self.http.inner().get(&url))
                .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())]);

            let parsed: Vec<Release> = self
                .http
                .send_ok(request)
                .await
                .with_context(|| format!("Failed to list releases of {}", repo))?
                .json()
                .await
                .context("Failed to parse JSON response from GitHub API")?;

            if parsed.is_empty() {
                break;
            }

            let len = parsed.len();
            releases.extend(parsed);

            if len < PER_PAGE {
                break;
            }

            page += 1;
        }

        Ok(releases)
    }

    fn api_url(&self) -> &str {
        &self.api_url
    }
}
