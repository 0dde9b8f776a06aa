use anyhow::{Context, Result, anyhow, bail};
use log::info;
use std::path::Path;

use crate::model::{ComponentLock, ComponentSpec, Lockfile, Specfile};
use crate::source::ReleaseSourceList;

/// How one release should be moved to a new version.
#[derive(Debug, Clone)]
pub struct UpdateRequest<'a> {
    pub name: &'a str,
    /// Exact version to lock. Without a download it is used as a constraint,
    /// and an empty value falls back to the spec's constraint.
    pub version: &'a str,
    pub releases_dir: &'a Path,
    /// Resolve and checksum through the sources instead of downloading into
    /// `releases_dir`.
    pub without_download: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The lock already pointed at the resolved build.
    Unchanged,
    Updated {
        from: ComponentLock,
        to: ComponentLock,
    },
}

/// Re-resolves one locked release and records the result in `lockfile`.
///
/// The caller persists `lockfile` when the outcome is [`UpdateOutcome::Updated`].
#[tracing::instrument(skip(specfile, lockfile, sources))]
pub async fn update_release(
    specfile: &Specfile,
    lockfile: &mut Lockfile,
    sources: &ReleaseSourceList,
    request: &UpdateRequest<'_>,
) -> Result<UpdateOutcome> {
    let name = request.name;
    let current = lockfile.find_release(name).cloned().ok_or_else(|| {
        anyhow!(
            "no release named {:?} exists in the lock file - try removing the -release, -boshrelease, or -bosh-release suffix if present",
            name
        )
    })?;
    let declared = specfile
        .component_spec(name)
        .ok_or_else(|| anyhow!("failed to find release with name {:?} in spec file", name))?;

    let mut spec = ComponentSpec::new(name, request.version)
        .with_stemcell(
            lockfile.stemcell_criteria.os.clone(),
            lockfile.stemcell_criteria.version.clone(),
        )
        .with_github_repository(declared.github_repository.clone());

    info!("Searching for the release...");
    let resolved = if request.without_download {
        if spec.version.is_empty() {
            spec.version = declared.version.clone();
        }
        sources
            .find_release_version(&spec, false)
            .await
            .context("error finding the release")?
    } else {
        if spec.version.is_empty() {
            bail!("a version is required to update {:?} with a download", name);
        }
        download_matched(sources, &spec, request.releases_dir).await?
    };

    let unchanged = current.version == resolved.version
        && current.sha1 == resolved.sha1
        && current.remote_source == resolved.remote_source
        && current.remote_path == resolved.remote_path;
    if unchanged {
        info!("Neither the version nor remote location of {} changed", name);
        return Ok(UpdateOutcome::Unchanged);
    }

    let updated = ComponentLock {
        version: resolved.version,
        sha1: resolved.sha1,
        remote_source: resolved.remote_source,
        remote_path: resolved.remote_path,
        ..current.clone()
    };
    lockfile.update_release(updated.clone());
    Ok(UpdateOutcome::Updated {
        from: current,
        to: updated,
    })
}

/// Downloads the exact build and checks it against any checksum the source reported.
async fn download_matched(
    sources: &ReleaseSourceList,
    spec: &ComponentSpec,
    dir: &Path,
) -> Result<ComponentLock> {
    let remote = sources
        .get_matched_release(spec)
        .await
        .context("error finding the release")?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("error with releases directory {:?}", dir))?;
    let local = sources
        .download_release(dir, &remote)
        .await
        .context("error downloading the release")?;

    if remote.has_checksum() && remote.sha1 != local.lock.sha1 {
        tokio::fs::remove_file(&local.local_path)
            .await
            .with_context(|| format!("error deleting bad release file {:?}", local.local_path))?;
        bail!(
            "downloaded release {:?} had an incorrect SHA1 - expected {:?}, got {:?}",
            local.local_path,
            remote.sha1,
            local.lock.sha1
        );
    }

    Ok(ComponentLock {
        version: local.lock.version,
        sha1: local.lock.sha1,
        ..remote
    })
}
