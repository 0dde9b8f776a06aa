//! Release sources: one contract, one adapter per kind of artifact store.
//!
//! Each adapter answers the same questions about a [`ComponentSpec`]: is this
//! exact build present, what is the best version available, and where does it
//! download from. [`ReleaseSourceList`] combines the configured adapters in
//! order.

mod artifactory;
mod bosh_io;
mod factory;
mod github;
mod list;
mod s3;
mod s3_signer;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::error::StoreError;
use crate::model::{ComponentLock, ComponentSpec, LocalLock, StoreConfig};

pub use artifactory::ArtifactorySource;
pub use bosh_io::{BoshIoSource, DEFAULT_BOSH_IO_SERVER, DEFAULT_PUBLISHERS, DEFAULT_SUFFIXES};
pub use factory::{new_release_source, new_release_source_list};
pub use github::GitHubSource;
pub use list::ReleaseSourceList;
pub use s3::S3Source;

/// Contract every artifact store adapter implements.
///
/// Adapters are immutable after construction apart from
/// [`set_download_threads`](ReleaseSource::set_download_threads). Optional
/// capabilities are advertised by the `supports_*` methods.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    fn configuration(&self) -> &StoreConfig;

    /// Looks up exactly `(name, version[, stemcell])`.
    async fn get_matched_release(&self, spec: &ComponentSpec) -> Result<Option<ComponentLock>>;

    /// Finds the highest version satisfying the spec's constraint.
    ///
    /// With `no_download` the returned checksum may be
    /// [`CHECKSUM_NOT_CALCULATED`](crate::model::CHECKSUM_NOT_CALCULATED).
    async fn find_release_version(
        &self,
        spec: &ComponentSpec,
        no_download: bool,
    ) -> Result<Option<ComponentLock>>;

    /// Downloads the artifact into `dir`, recording the SHA-1 of the local copy.
    async fn download_release(&self, dir: &Path, lock: &ComponentLock) -> Result<LocalLock>;

    fn supports_upload(&self) -> bool {
        false
    }

    async fn upload_release(&self, spec: &ComponentSpec, content: Vec<u8>) -> Result<ComponentLock> {
        let _ = content;
        Err(unsupported(self.configuration(), &format!("upload {}", spec.name)))
    }

    fn supports_remote_path(&self) -> bool {
        false
    }

    fn remote_path(&self, spec: &ComponentSpec) -> Result<String> {
        Err(unsupported(
            self.configuration(),
            &format!("compute a remote path for {}", spec.name),
        ))
    }

    /// Number of parallel requests used per download; ignored by adapters that stream.
    fn set_download_threads(&mut self, threads: usize) {
        let _ = threads;
    }
}

fn unsupported(config: &StoreConfig, action: &str) -> anyhow::Error {
    StoreError::Unsupported(format!(
        "release source {:?} ({}) cannot {}",
        config.effective_id(),
        config.kind,
        action
    ))
    .into()
}

/// Local file name for an artifact whose remote path is a plain key.
fn file_name_from_remote_path(remote_path: &str) -> &str {
    remote_path.rsplit('/').next().unwrap_or(remote_path)
}

/// Local file name for an artifact whose remote path is a URL.
fn tarball_file_name(lock: &ComponentLock) -> String {
    format!("{}-{}.tgz", lock.name, lock.version)
}
