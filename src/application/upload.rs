use anyhow::{Context, Result, bail};
use log::info;
use std::path::Path;

use crate::model::{ComponentLock, ComponentSpec, parse_version};
use crate::source::ReleaseSourceList;
use crate::tarball::read_release_manifest;

/// Uploads a finalized release tarball to the source with id `target_id`.
///
/// The name and version come from the tarball's own manifest. Development
/// builds and releases the target already holds are refused.
#[tracing::instrument(skip(sources))]
pub async fn upload_release(
    sources: &ReleaseSourceList,
    target_id: &str,
    tarball: &Path,
) -> Result<ComponentLock> {
    let uploader = sources
        .find_uploader(target_id)
        .context("error finding release source")?;

    let path = tarball.to_path_buf();
    let manifest = tokio::task::spawn_blocking(move || read_release_manifest(&path))
        .await
        .context("manifest reader panicked")?
        .context("error reading the release manifest")?;

    let version = parse_version(&manifest.version).with_context(|| {
        format!(
            "error parsing release version {:?}: release version is not valid semver",
            manifest.version
        )
    })?;
    if !version.pre.is_empty() {
        bail!(
            "cannot upload development release {:?} - only finalized releases are allowed",
            manifest.version
        );
    }

    let spec = ComponentSpec::new(manifest.name.clone(), manifest.version.clone());
    let existing = uploader
        .get_matched_release(&spec)
        .await
        .context("couldn't query release source")?;
    if existing.is_some() {
        bail!(
            "a release with name {:?} and version {:?} already exists on {}",
            manifest.name,
            manifest.version,
            target_id
        );
    }

    let content = tokio::fs::read(tarball)
        .await
        .with_context(|| format!("Failed to read tarball {:?}", tarball))?;
    let lock = uploader
        .upload_release(&spec, content)
        .await
        .context("error uploading the release")?;
    info!("Upload succeeded: {}", lock);
    Ok(lock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StoreConfig, StoreType};
    use crate::source::{MockReleaseSource, ReleaseSource};
    use crate::tarball::tests::write_tarball;
    use tempfile::tempdir;

    fn artifactory() -> MockReleaseSource {
        let mut mock = MockReleaseSource::new();
        mock.expect_configuration().return_const(StoreConfig {
            id: Some("build".into()),
            ..StoreConfig::new(StoreType::Artifactory)
        });
        mock.expect_supports_upload().return_const(true);
        mock
    }

    fn list(mock: MockReleaseSource) -> ReleaseSourceList {
        let sources: Vec<Box<dyn ReleaseSource>> = vec![Box::new(mock)];
        ReleaseSourceList::new(sources).unwrap()
    }

    fn tarball(dir: &Path, version: &str) -> std::path::PathBuf {
        let path = dir.join("bpm.tgz");
        let manifest = format!("name: bpm\nversion: {}\n", version);
        write_tarball(&path, &[("./release.MF", manifest.as_str())]).unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_release() {
        let dir = tempdir().unwrap();
        let path = tarball(dir.path(), "1.2.3");
        let expected_len = std::fs::metadata(&path).unwrap().len() as usize;

        let mut mock = artifactory();
        mock.expect_get_matched_release()
            .withf(|spec| spec.name == "bpm" && spec.version == "1.2.3")
            .returning(|_| Ok(None));
        mock.expect_upload_release()
            .withf(move |spec, content| spec.name == "bpm" && content.len() == expected_len)
            .times(1)
            .returning(|spec, _| Ok(spec.lock().with_remote("build", "bpm/bpm-1.2.3.tgz")));

        let lock = upload_release(&list(mock), "build", &path).await.unwrap();
        assert_eq!(lock.remote_path, "bpm/bpm-1.2.3.tgz");
    }

    #[tokio::test]
    async fn test_upload_refuses_existing_release() {
        let dir = tempdir().unwrap();
        let path = tarball(dir.path(), "1.2.3");

        let mut mock = artifactory();
        mock.expect_get_matched_release()
            .returning(|spec| Ok(Some(spec.lock())));
        mock.expect_upload_release().never();

        let err = upload_release(&list(mock), "build", &path).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"a release with name "bpm" and version "1.2.3" already exists on build"#
        );
    }

    #[tokio::test]
    async fn test_upload_refuses_development_release() {
        let dir = tempdir().unwrap();
        let path = tarball(dir.path(), "1.2.3-dev.4");

        let mut mock = artifactory();
        mock.expect_get_matched_release().never();
        mock.expect_upload_release().never();

        let err = upload_release(&list(mock), "build", &path).await.unwrap_err();
        assert!(err.to_string().contains("cannot upload development release"));
    }

    #[tokio::test]
    async fn test_upload_needs_capable_target() {
        let dir = tempdir().unwrap();
        let path = tarball(dir.path(), "1.2.3");

        let mut mock = MockReleaseSource::new();
        mock.expect_configuration()
            .return_const(StoreConfig::new(StoreType::BoshIo));
        mock.expect_supports_upload().return_const(false);

        let err = upload_release(&list(mock), "bosh.io", &path).await.unwrap_err();
        assert_eq!(err.to_string(), "error finding release source");
    }
}
