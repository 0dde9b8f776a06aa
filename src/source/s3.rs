use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use regex::Regex;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Method, RequestBuilder, Response};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use url::Url;

use super::s3_signer::{EMPTY_PAYLOAD_SHA256, SigV4Signer, uri_encode};
use super::{ReleaseSource, file_name_from_remote_path};
use crate::download::{
    DEFAULT_DOWNLOAD_THREADS, DEFAULT_PART_SIZE, Sha1Sink, download_ranges, range_header,
};
use crate::error::StoreError;
use crate::http::HttpClient;
use crate::model::{
    CHECKSUM_NOT_CALCULATED, ComponentLock, ComponentSpec, LocalLock, StoreConfig, parse_version,
};
use crate::template::PathTemplate;

const DEFAULT_REGION: &str = "us-east-1";

static LEADING_MAJOR_MINOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+").expect("static regex"));
static VERSION_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-v]\d+(?:\.\d+)*").expect("static regex"));
static LIST_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Key>([^<]*)</Key>").expect("static regex"));
static LIST_TRUNCATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<IsTruncated>\s*true\s*</IsTruncated>").expect("static regex"));
static XML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(lt|gt|quot|apos|amp|#[0-9]+|#[xX][0-9a-fA-F]+);").expect("static regex")
});
static LIST_NEXT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<NextContinuationToken>([^<]*)</NextContinuationToken>").expect("static regex")
});

/// Releases stored as objects in an S3 bucket, located by a path template.
pub struct S3Source {
    config: StoreConfig,
    http: HttpClient,
    template: PathTemplate,
    endpoint: String,
    signer: Option<SigV4Signer>,
    download_threads: usize,
    part_size: u64,
}

impl S3Source {
    pub fn new(config: StoreConfig, http: HttpClient) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(StoreError::Configuration("s3 release source requires a bucket".into()).into());
        }
        let template = PathTemplate::parse(&config.path_template).map_err(StoreError::from)?;

        let region = if config.region.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            config.region.clone()
        };
        let endpoint = if config.endpoint.is_empty() {
            format!("https://s3.{}.amazonaws.com", region)
        } else {
            config.endpoint.trim_end_matches('/').to_string()
        };
        let signer = (!config.access_key_id.is_empty()).then(|| {
            SigV4Signer::new(
                config.access_key_id.clone(),
                config.secret_access_key.clone(),
                region.clone(),
            )
        });

        Ok(Self {
            config,
            http,
            template,
            endpoint,
            signer,
            download_threads: DEFAULT_DOWNLOAD_THREADS,
            part_size: DEFAULT_PART_SIZE,
        })
    }

    #[cfg(test)]
    fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    fn id(&self) -> String {
        self.config.effective_id()
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            uri_encode(&self.config.bucket, true),
            uri_encode(key, false)
        )
    }

    /// Builds a request, signing it when credentials are configured.
    fn request(
        &self,
        method: Method,
        url: &str,
        extra_headers: &[(&str, String)],
    ) -> Result<RequestBuilder> {
        let parsed = Url::parse(url).with_context(|| format!("invalid S3 URL {}", url))?;
        let mut request = self.http.inner().request(method.clone(), parsed.clone());
        for (name, value) in extra_headers {
            request = request.header(*name, value);
        }

        if let Some(signer) = &self.signer {
            let headers: BTreeMap<String, String> = extra_headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect();
            for (name, value) in signer.sign(
                method.as_str(),
                &parsed,
                &headers,
                EMPTY_PAYLOAD_SHA256,
                Utc::now(),
            )? {
                request = request.header(name, value);
            }
        }
        Ok(request)
    }

    /// Lists every key under `prefix`, following continuation tokens.
    #[tracing::instrument(skip(self))]
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/{}?list-type=2&prefix={}",
                self.endpoint,
                uri_encode(&self.config.bucket, true),
                uri_encode(prefix, true)
            );
            if let Some(token) = &continuation {
                url.push_str(&format!("&continuation-token={}", uri_encode(token, true)));
            }

            let body = self
                .http
                .send_ok(self.request(Method::GET, &url, &[])?)
                .await?
                .text()
                .await
                .context("Failed to read S3 list response")?;

            keys.extend(
                LIST_KEY
                    .captures_iter(&body)
                    .map(|caps| unescape_xml(&caps[1])),
            );

            continuation = if LIST_TRUNCATED.is_match(&body) {
                LIST_NEXT_TOKEN
                    .captures(&body)
                    .map(|caps| unescape_xml(&caps[1]))
            } else {
                None
            };
            if continuation.is_none() {
                break;
            }
        }

        debug!("Found {} keys under {:?}", keys.len(), prefix);
        Ok(keys)
    }

    /// The HEAD response for `key`, or `None` when the object does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<Response>> {
        let request = self.request(Method::HEAD, &self.object_url(key), &[])?;
        self.http.send_optional(request).await
    }

    /// Size of an existing object; ranged downloads are planned from it.
    async fn object_size(&self, key: &str) -> Result<u64> {
        let response = self.head_object(key).await?.ok_or_else(|| {
            anyhow!("object {} not found in bucket {}", key, self.config.bucket)
        })?;
        content_length(response.headers()).ok_or_else(|| {
            anyhow!(
                "S3 returned no valid Content-Length for {} in bucket {}",
                key,
                self.config.bucket
            )
        })
    }

    async fn checksum_object(&self, key: &str) -> Result<String> {
        let mut sink = Sha1Sink::new();
        let request = self.request(Method::GET, &self.object_url(key), &[])?;
        self.http.download_to(request, &mut sink).await?;
        Ok(sink.hex_digest())
    }

    fn search_prefix(&self, spec: &ComponentSpec) -> String {
        match LEADING_MAJOR_MINOR.find(&self.config.path_template) {
            Some(m) => format!("{}/{}/", m.as_str(), spec.name),
            None => format!("{}/", spec.name),
        }
    }
}

/// Version and stemcell version tokens found in an object's base name.
fn key_versions(key: &str) -> Option<(String, Option<String>)> {
    let base = file_name_from_remote_path(key);
    let tokens: Vec<&str> = VERSION_TOKEN.find_iter(base).map(|m| &m.as_str()[1..]).collect();
    let version = tokens.first()?.to_string();
    let stemcell = (tokens.len() > 1).then(|| tokens[tokens.len() - 1].to_string());
    Some((version, stemcell))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn unescape_xml(input: &str) -> String {
    XML_ENTITY
        .replace_all(input, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .unwrap_or_else(|| entity[1..].parse())
                    .ok()
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

#[async_trait]
impl ReleaseSource for S3Source {
    fn configuration(&self) -> &StoreConfig {
        &self.config
    }

    #[tracing::instrument(skip(self))]
    async fn get_matched_release(&self, spec: &ComponentSpec) -> Result<Option<ComponentLock>> {
        let key = self.template.render(spec).map_err(StoreError::from)?;
        if self.head_object(&key).await?.is_none() {
            debug!("{} not found in bucket {}", key, self.config.bucket);
            return Ok(None);
        }
        Ok(Some(spec.lock().with_remote(self.id(), key)))
    }

    #[tracing::instrument(skip(self))]
    async fn find_release_version(
        &self,
        spec: &ComponentSpec,
        no_download: bool,
    ) -> Result<Option<ComponentLock>> {
        let constraint = spec.version_constraint()?;
        let prefix = self.search_prefix(spec);

        let mut best: Option<(semver::Version, ComponentLock)> = None;
        for key in self.list_keys(&prefix).await? {
            if !key.ends_with(".tgz") {
                continue;
            }
            let Some((version, stemcell_version)) = key_versions(&key) else {
                continue;
            };
            // Stemcell filters only apply to keys compiled against a stemcell.
            if let Some(stemcell_version) = &stemcell_version {
                if *stemcell_version != spec.stemcell_version {
                    continue;
                }
                if !spec.stemcell_os.is_empty()
                    && !file_name_from_remote_path(&key).contains(&spec.stemcell_os)
                {
                    continue;
                }
            }
            let Ok(parsed) = parse_version(&version) else {
                continue;
            };
            if !constraint.matches(&parsed) {
                continue;
            }
            if best.as_ref().is_some_and(|(v, _)| *v >= parsed) {
                continue;
            }

            let mut lock = spec.lock().with_remote(self.id(), key.clone());
            lock.version = version;
            if stemcell_version.is_none() {
                lock.stemcell_os.clear();
                lock.stemcell_version.clear();
            }
            best = Some((parsed, lock));
        }

        let Some((_, lock)) = best else {
            return Ok(None);
        };
        let sum = if no_download {
            CHECKSUM_NOT_CALCULATED.to_string()
        } else {
            self.checksum_object(&lock.remote_path).await?
        };
        Ok(Some(lock.with_sha1(sum)))
    }

    #[tracing::instrument(skip(self))]
    async fn download_release(&self, dir: &Path, lock: &ComponentLock) -> Result<LocalLock> {
        info!(
            "downloading {} from {} release source {}",
            lock.name,
            self.config.kind,
            self.id()
        );
        let key = &lock.remote_path;
        let size = self.object_size(key).await?;

        let local_path = dir.join(file_name_from_remote_path(key));
        let url = self.object_url(key);
        let sum = download_ranges(
            &self.http,
            &local_path,
            size,
            self.part_size,
            self.download_threads,
            |start, end| self.request(Method::GET, &url, &[(RANGE.as_str(), range_header(start, end))]),
        )
        .await
        .with_context(|| format!("failed to download {} from bucket {}", key, self.config.bucket))?;

        Ok(LocalLock {
            lock: lock.clone().with_sha1(sum),
            local_path,
        })
    }

    fn supports_remote_path(&self) -> bool {
        true
    }

    fn remote_path(&self, spec: &ComponentSpec) -> Result<String> {
        Ok(self.template.render(spec).map_err(StoreError::from)?)
    }

    fn set_download_threads(&mut self, threads: usize) {
        if threads > 0 {
            self.download_threads = threads;
        }
    }
}
