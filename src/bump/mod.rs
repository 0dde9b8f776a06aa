//! Differences between two lock snapshots, with release notes for what moved.

use futures_util::{StreamExt, stream};
use log::{debug, warn};
use semver::Version;
use std::collections::HashMap;
use std::fmt;

use crate::github::{GetReleases, GitHubRepo, Release};
use crate::model::{ComponentLock, Specfile, parse_version};

/// Concurrent release listings while collecting notes.
const RELEASE_NOTE_WORKERS: usize = 10;

/// A release whose locked version changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Bump {
    pub name: String,
    /// `None` when the release is new in the current lock.
    pub from: Option<ComponentLock>,
    pub to: ComponentLock,
    /// GitHub releases in `(from, to]`, newest first.
    pub releases: Vec<Release>,
}

impl Bump {
    pub fn from_version(&self) -> &str {
        self.from.as_ref().map(|l| l.version.as_str()).unwrap_or("")
    }

    pub fn to_version(&self) -> &str {
        &self.to.version
    }

    /// Bodies of the collected releases, newest first, blank ones skipped.
    pub fn release_notes_text(&self) -> String {
        self.releases
            .iter()
            .filter_map(|r| r.body.as_deref().map(str::trim))
            .filter(|body| !body.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn version_range(&self) -> Option<(Version, Version)> {
        let from = parse_version(self.from_version()).ok()?;
        let to = parse_version(self.to_version()).ok()?;
        Some((from, to))
    }
}

impl fmt::Display for Bump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.name, self.from_version(), self.to_version())
    }
}

/// Bumps for every current lock whose version differs from the previous one.
///
/// Releases that only exist in `previous` are not reported.
pub fn calculate_bumps(current: &[ComponentLock], previous: &[ComponentLock]) -> Vec<Bump> {
    let previous: HashMap<&str, &ComponentLock> =
        previous.iter().map(|l| (l.name.as_str(), l)).collect();

    current
        .iter()
        .filter_map(|lock| {
            let from = previous.get(lock.name.as_str()).copied();
            if from.is_some_and(|p| p.version == lock.version) {
                return None;
            }
            Some(Bump {
                name: lock.name.clone(),
                from: from.cloned(),
                to: lock.clone(),
                releases: Vec::new(),
            })
        })
        .collect()
}

pub trait BumpList {
    /// The bump for `lock`, or a no-op bump from its version to itself.
    fn for_lock(&self, lock: &ComponentLock) -> Bump;
}

impl BumpList for [Bump] {
    fn for_lock(&self, lock: &ComponentLock) -> Bump {
        self.iter()
            .find(|b| b.name == lock.name)
            .cloned()
            .unwrap_or_else(|| Bump {
                name: lock.name.clone(),
                from: Some(lock.clone()),
                to: lock.clone(),
                releases: Vec::new(),
            })
    }
}

/// Attaches GitHub releases between each bump's versions.
///
/// Listings run on a fixed pool; a failed listing is logged and leaves that
/// bump without notes. The result keeps the input order.
#[tracing::instrument(skip_all)]
pub async fn release_notes(
    specfile: &Specfile,
    bumps: Vec<Bump>,
    lister: &dyn GetReleases,
) -> Vec<Bump> {
    let mut slots: Vec<Option<Bump>> = Vec::with_capacity(bumps.len());
    slots.resize_with(bumps.len(), || None);

    let mut results = stream::iter(bumps.into_iter().enumerate())
        .map(|(index, bump)| async move { (index, fetch_releases_for_bump(specfile, bump, lister).await) })
        .buffer_unordered(RELEASE_NOTE_WORKERS);

    while let Some((index, bump)) = results.next().await {
        slots[index] = Some(bump);
    }
    slots.into_iter().flatten().collect()
}

async fn fetch_releases_for_bump(specfile: &Specfile, mut bump: Bump, lister: &dyn GetReleases) -> Bump {
    let Some(spec) = specfile.component_spec(&bump.name) else {
        return bump;
    };
    if spec.github_repository.is_empty() {
        return bump;
    }
    let Some((from, to)) = bump.version_range() else {
        debug!("no version range for {}", bump);
        return bump;
    };
    let repo = match GitHubRepo::from_repository_url(&spec.github_repository) {
        Ok(repo) => repo,
        Err(e) => {
            warn!("skipping release notes for {}: {}", bump.name, e);
            return bump;
        }
    };

    let releases = match lister.get_releases(&repo).await {
        Ok(releases) => releases,
        Err(e) => {
            warn!("failed to list releases of {}: {:#}", repo, e);
            return bump;
        }
    };

    let mut in_range: Vec<(Version, Release)> = releases
        .into_iter()
        .filter_map(|r| parse_version(&r.tag_name).ok().map(|v| (v, r)))
        .filter(|(v, _)| *v > from && *v <= to)
        .collect();
    in_range.sort_by(|(a, _), (b, _)| b.cmp(a));

    let mut seen = std::collections::HashSet::new();
    bump.releases = in_range
        .into_iter()
        .map(|(_, r)| r)
        .filter(|r| seen.insert(r.tag_name.clone()))
        .collect();
    bump
}
