use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::download::sha1_file;
use crate::model::{ComponentLock, LocalLock, Lockfile};
use crate::source::ReleaseSourceList;

/// What a fetch found on disk and what it had to download.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub present: Vec<LocalLock>,
    pub downloaded: Vec<LocalLock>,
}

/// File names a lock's artifact may have been saved under.
fn local_candidates(dir: &Path, lock: &ComponentLock) -> Vec<PathBuf> {
    let mut names = vec![format!("{}-{}.tgz", lock.name, lock.version)];
    let base = lock
        .remote_path
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .rsplit('/')
        .next()
        .unwrap_or("");
    if !base.is_empty() && !names.iter().any(|n| n == base) {
        names.push(base.to_string());
    }
    names.into_iter().map(|n| dir.join(n)).collect()
}

/// A local copy whose checksum equals the locked one, if any.
async fn find_present(dir: &Path, lock: &ComponentLock) -> Result<Option<LocalLock>> {
    if !lock.has_checksum() {
        return Ok(None);
    }
    for path in local_candidates(dir, lock) {
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            continue;
        }
        let sum = sha1_file(&path).await?;
        if sum == lock.sha1 {
            return Ok(Some(LocalLock {
                lock: lock.clone(),
                local_path: path,
            }));
        }
        debug!("{:?} has checksum {}, lock wants {}", path, sum, lock.sha1);
    }
    Ok(None)
}

/// Downloads every locked release that is not already in `dir` with the locked checksum.
///
/// A download whose checksum differs from a known locked checksum is deleted
/// and fails the fetch.
#[tracing::instrument(skip(lockfile, sources))]
pub async fn fetch(dir: &Path, lockfile: &Lockfile, sources: &ReleaseSourceList) -> Result<FetchReport> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("error with releases directory {:?}", dir))?;

    let mut report = FetchReport::default();
    let mut missing = Vec::new();
    for lock in &lockfile.releases {
        match find_present(dir, lock).await? {
            Some(local) => report.present.push(local),
            None => missing.push(lock),
        }
    }

    if missing.is_empty() {
        info!("All {} releases are present in {:?}", report.present.len(), dir);
        return Ok(report);
    }
    info!("Found {} missing releases to download", missing.len());

    for lock in missing {
        let remote = ComponentLock {
            sha1: String::new(),
            ..lock.clone()
        };
        let local = sources
            .download_release(dir, &remote)
            .await
            .context("download failed")?;

        if lock.has_checksum() && local.lock.sha1 != lock.sha1 {
            tokio::fs::remove_file(&local.local_path)
                .await
                .with_context(|| format!("error deleting bad release file {:?}", local.local_path))?;
            bail!(
                "downloaded release {:?} had an incorrect SHA1 - expected {:?}, got {:?}",
                local.local_path,
                lock.sha1,
                local.lock.sha1
            );
        }
        if !lock.has_checksum() {
            warn!(
                "{} has no recorded checksum; keeping download with SHA1 {}",
                lock.name, local.lock.sha1
            );
        }
        report.downloaded.push(local);
    }

    Ok(report)
}
