use anyhow::{Context, Result};
use log::debug;
use std::path::Path;

use super::ReleaseSource;
use crate::error::StoreError;
use crate::model::{ComponentLock, ComponentSpec, LocalLock};

/// The configured release sources, in specfile order.
pub struct ReleaseSourceList {
    sources: Vec<Box<dyn ReleaseSource>>,
}

impl std::fmt::Debug for ReleaseSourceList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl ReleaseSourceList {
    /// Fails when two sources share an effective id.
    pub fn new(sources: Vec<Box<dyn ReleaseSource>>) -> Result<Self> {
        let ids: Vec<String> = sources
            .iter()
            .map(|s| s.configuration().effective_id())
            .collect();
        for (second, id) in ids.iter().enumerate() {
            if let Some(first) = ids[..second].iter().position(|other| other == id) {
                return Err(StoreError::DuplicateId {
                    first,
                    second,
                    id: id.clone(),
                }
                .into());
            }
        }
        Ok(Self { sources })
    }

    /// Keeps only publishable sources when `only_publishable` is set.
    pub fn filter(self, only_publishable: bool) -> Self {
        if !only_publishable {
            return self;
        }
        Self {
            sources: self
                .sources
                .into_iter()
                .filter(|s| s.configuration().publishable)
                .collect(),
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|s| s.configuration().effective_id())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn not_found(&self, spec: &ComponentSpec) -> anyhow::Error {
        StoreError::NotFound {
            name: spec.name.clone(),
            constraint: spec.version.clone(),
            sources: self.ids(),
        }
        .into()
    }

    /// First source holding exactly the spec's version wins.
    #[tracing::instrument(skip(self))]
    pub async fn get_matched_release(&self, spec: &ComponentSpec) -> Result<ComponentLock> {
        for source in &self.sources {
            let id = source.configuration().effective_id();
            let found = source
                .get_matched_release(spec)
                .await
                .with_context(|| format!("error from release source {:?}", id))?;
            if let Some(lock) = found {
                debug!("{} matched in {}", spec, id);
                return Ok(lock);
            }
        }
        Err(self.not_found(spec))
    }

    /// Asks every source and keeps the greatest version found.
    ///
    /// A lock whose version does not parse never displaces an earlier one.
    #[tracing::instrument(skip(self))]
    pub async fn find_release_version(
        &self,
        spec: &ComponentSpec,
        no_download: bool,
    ) -> Result<ComponentLock> {
        let mut best: Option<ComponentLock> = None;
        for source in &self.sources {
            let id = source.configuration().effective_id();
            let found = source
                .find_release_version(spec, no_download)
                .await
                .with_context(|| format!("error from release source {:?}", id))?;
            let Some(lock) = found else {
                debug!("{} not found in {}", spec, id);
                continue;
            };
            best = match best {
                None => Some(lock),
                Some(current) => match (current.parse_version(), lock.parse_version()) {
                    (Ok(have), Ok(candidate)) if candidate > have => Some(lock),
                    _ => Some(current),
                },
            };
        }
        best.ok_or_else(|| self.not_found(spec))
    }

    /// Downloads through the source named by the lock's `remote_source`.
    #[tracing::instrument(skip(self))]
    pub async fn download_release(&self, dir: &Path, lock: &ComponentLock) -> Result<LocalLock> {
        let source = self.find_by_id(&lock.remote_source)?;
        source
            .download_release(dir, lock)
            .await
            .with_context(|| {
                format!(
                    "error from release source {:?}",
                    source.configuration().effective_id()
                )
            })
    }

    pub fn find_by_id(&self, id: &str) -> Result<&dyn ReleaseSource> {
        self.sources
            .iter()
            .find(|s| s.configuration().explicit_id() == Some(id))
            .or_else(|| self.sources.iter().find(|s| s.configuration().answers_to(id)))
            .map(|s| s.as_ref())
            .ok_or_else(|| {
                StoreError::UnknownSource {
                    id: id.to_string(),
                    available: self.ids(),
                }
                .into()
            })
    }

    /// Source with id `id` that can upload releases.
    pub fn find_uploader(&self, id: &str) -> Result<&dyn ReleaseSource> {
        self.find_capable(id, |s| s.supports_upload())
    }

    /// Source with id `id` that can compute remote paths.
    pub fn find_remote_pather(&self, id: &str) -> Result<&dyn ReleaseSource> {
        self.find_capable(id, |s| s.supports_remote_path())
    }

    fn find_capable<F>(&self, id: &str, capable: F) -> Result<&dyn ReleaseSource>
    where
        F: Fn(&dyn ReleaseSource) -> bool,
    {
        let candidates: Vec<&dyn ReleaseSource> = self
            .sources
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| capable(*s))
            .collect();
        candidates
            .iter()
            .copied()
            .find(|s| s.configuration().answers_to(id))
            .ok_or_else(|| {
                StoreError::UnknownSource {
                    id: id.to_string(),
                    available: candidates
                        .iter()
                        .map(|s| s.configuration().effective_id())
                        .collect(),
                }
                .into()
            })
    }

    pub fn set_download_threads(&mut self, threads: usize) {
        for source in &mut self.sources {
            source.set_download_threads(threads);
        }
    }
}
