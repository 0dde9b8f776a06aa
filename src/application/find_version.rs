use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::model::{ComponentLock, Lockfile, Specfile};
use crate::source::ReleaseSourceList;

/// JSON printed by `find-release-version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseVersionOutput {
    pub version: String,
    pub remote_path: String,
    pub source: String,
    pub sha: String,
}

impl From<ComponentLock> for ReleaseVersionOutput {
    fn from(lock: ComponentLock) -> Self {
        Self {
            version: lock.version,
            remote_path: lock.remote_path,
            source: lock.remote_source,
            sha: lock.sha1,
        }
    }
}

/// Resolves the best available version of one release, compiled against the
/// lock file's stemcell.
#[tracing::instrument(skip(specfile, lockfile, sources))]
pub async fn find_release_version(
    specfile: &Specfile,
    lockfile: &Lockfile,
    sources: &ReleaseSourceList,
    name: &str,
    no_download: bool,
) -> Result<ComponentLock> {
    let spec = specfile
        .component_spec(name)
        .ok_or_else(|| anyhow!("failed to find release with name {:?} in spec file", name))?
        .clone()
        .with_stemcell(
            lockfile.stemcell_criteria.os.clone(),
            lockfile.stemcell_criteria.version.clone(),
        );
    sources.find_release_version(&spec, no_download).await
}
