//! Reading the manifest out of a release tarball.

use anyhow::{Context, Result, anyhow};
use flate2::read::GzDecoder;
use log::debug;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;

const MANIFEST_NAME: &str = "release.MF";

/// Name and version a release tarball declares about itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseManifest {
    pub name: String,
    pub version: String,
}

/// Reads `release.MF` from the top level of a gzipped release tarball.
#[tracing::instrument]
pub fn read_release_manifest(path: &Path) -> Result<ReleaseManifest> {
    let file = File::open(path).with_context(|| format!("Failed to open tarball {:?}", path))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive
        .entries()
        .with_context(|| format!("Failed to read tarball {:?}", path))?
    {
        let mut entry = entry.with_context(|| format!("Failed to read entry in {:?}", path))?;
        let entry_path = entry.path()?.into_owned();
        let top_level = entry_path
            .strip_prefix(".")
            .unwrap_or(&entry_path)
            .to_path_buf();
        if top_level != Path::new(MANIFEST_NAME) {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .with_context(|| format!("Failed to read {} in {:?}", MANIFEST_NAME, path))?;
        let manifest: ReleaseManifest = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {} in {:?}", MANIFEST_NAME, path))?;
        debug!("{:?} is {} {}", path, manifest.name, manifest.version);
        return Ok(manifest);
    }

    Err(anyhow!("{} not found in {:?}", MANIFEST_NAME, path))
}
