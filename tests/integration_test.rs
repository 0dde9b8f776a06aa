use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::Server;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

// sha1("abc")
const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

fn relfetch(specfile: &Path) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("relfetch"));
    cmd.env_remove("GITHUB_TOKEN")
        .env_remove("RELFETCH_SPECFILE")
        .arg("--specfile")
        .arg(specfile);
    cmd
}

fn write_tile(dir: &Path, specfile: &str, lockfile: &str) -> std::path::PathBuf {
    let path = dir.join("Tilefile");
    std::fs::write(&path, specfile).unwrap();
    std::fs::write(dir.join("Tilefile.lock"), lockfile).unwrap();
    path
}

fn bosh_io_tile(endpoint: &str) -> String {
    format!(
        r#"
release_sources:
  - type: bosh.io
    endpoint: {endpoint}
releases:
  - name: bpm
    version: ~1
"#
    )
}

#[test]
fn test_validate_consistent_files() {
    let dir = tempdir().unwrap();
    let specfile = write_tile(
        dir.path(),
        &bosh_io_tile("https://bosh.io"),
        r#"
releases:
  - name: bpm
    version: 1.1.0
    sha1: a9993e364706816aba3e25717850c26c9cd0d89d
    remote_source: bosh.io
    remote_path: https://bosh.io/d/github.com/cloudfoundry/bpm-release?v=1.1.0
"#,
    );

    relfetch(&specfile).arg("validate").assert().success();
}

#[test]
fn test_validate_reports_every_error() {
    let dir = tempdir().unwrap();
    let specfile = write_tile(
        dir.path(),
        &bosh_io_tile("https://bosh.io"),
        r#"
releases:
  - name: bpm
    version: 2.0.0
    remote_source: bosh.io
  - name: garden
    version: 1.0.0
    remote_source: elsewhere
"#,
    );

    relfetch(&specfile)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            r#"spec bpm version in lock "2.0.0" does not match constraint "~1""#,
        ))
        .stderr(predicate::str::contains(r#"release "garden" not found in spec"#))
        .stderr(predicate::str::contains(
            r#"release source "elsewhere" for release lock "garden" not found"#,
        ));
}

#[test]
fn test_bumps() {
    let dir = tempdir().unwrap();
    let specfile = write_tile(
        dir.path(),
        &bosh_io_tile("https://bosh.io"),
        r#"
releases:
  - name: bpm
    version: 1.2.0
  - name: uaa
    version: 74.0.0
"#,
    );
    let previous = dir.path().join("previous.lock");
    std::fs::write(
        &previous,
        "releases:\n  - name: bpm\n    version: 1.1.0\n  - name: uaa\n    version: 74.0.0\n",
    )
    .unwrap();

    relfetch(&specfile)
        .arg("bumps")
        .arg("--previous-lockfile")
        .arg(&previous)
        .assert()
        .success()
        .stdout(predicate::str::contains("bpm 1.1.0 -> 1.2.0"))
        .stdout(predicate::str::contains("uaa").not());
}

#[test]
fn test_find_release_version_from_bosh_io() {
    let mut server = Server::new();
    let url = server.url();

    let _releases = server
        .mock("GET", "/api/v1/releases/github.com/cloudfoundry/bpm-release")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"version": "2.0.0", "sha1": "sha-200"},
                {"version": "1.1.0", "sha1": "sha-110"},
                {"version": "1.0.0", "sha1": "sha-100"}
            ]"#,
        )
        .create();

    let dir = tempdir().unwrap();
    let specfile = write_tile(dir.path(), &bosh_io_tile(&url), "releases: []\n");

    let expected = format!(
        r#"{{"version":"1.1.0","remote_path":"{}/d/github.com/cloudfoundry/bpm-release?v=1.1.0","source":"bosh.io","sha":"sha-110"}}"#,
        url
    );
    relfetch(&specfile)
        .arg("find-release-version")
        .arg("--release")
        .arg("bpm")
        .assert()
        .success()
        .stdout(predicate::str::contains(expected));
}

#[test]
fn test_fetch_downloads_and_verifies() {
    let mut server = Server::new();
    let url = server.url();

    let download = server
        .mock("GET", "/d/github.com/cloudfoundry/bpm-release?v=1.1.0")
        .with_status(200)
        .with_body("abc")
        .expect(1)
        .create();

    let dir = tempdir().unwrap();
    let specfile = write_tile(
        dir.path(),
        &bosh_io_tile(&url),
        &format!(
            r#"
releases:
  - name: bpm
    version: 1.1.0
    sha1: {ABC_SHA1}
    remote_source: bosh.io
    remote_path: {url}/d/github.com/cloudfoundry/bpm-release?v=1.1.0
"#
        ),
    );
    let releases = dir.path().join("releases");

    relfetch(&specfile)
        .arg("fetch")
        .arg("--releases-directory")
        .arg(&releases)
        .assert()
        .success();
    assert_eq!(std::fs::read(releases.join("bpm-1.1.0.tgz")).unwrap(), b"abc");

    // second run finds the file and does not download again
    relfetch(&specfile)
        .arg("fetch")
        .arg("--releases-directory")
        .arg(&releases)
        .assert()
        .success();
    download.assert();
}

#[test]
fn test_fetch_rejects_checksum_mismatch() {
    let mut server = Server::new();
    let url = server.url();

    let _download = server
        .mock("GET", "/d/github.com/cloudfoundry/bpm-release?v=1.1.0")
        .with_status(200)
        .with_body("not what was locked")
        .create();

    let dir = tempdir().unwrap();
    let specfile = write_tile(
        dir.path(),
        &bosh_io_tile(&url),
        &format!(
            r#"
releases:
  - name: bpm
    version: 1.1.0
    sha1: {ABC_SHA1}
    remote_source: bosh.io
    remote_path: {url}/d/github.com/cloudfoundry/bpm-release?v=1.1.0
"#
        ),
    );
    let releases = dir.path().join("releases");

    relfetch(&specfile)
        .arg("fetch")
        .arg("--releases-directory")
        .arg(&releases)
        .assert()
        .failure()
        .stderr(predicate::str::contains("incorrect SHA1"));
    assert!(!releases.join("bpm-1.1.0.tgz").exists());
}

#[test]
fn test_update_release_rewrites_lockfile() {
    let mut server = Server::new();
    let url = server.url();

    let _releases = server
        .mock("GET", "/api/v1/releases/github.com/cloudfoundry/bpm-release")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"[{{"version": "1.2.0", "sha1": "{ABC_SHA1}"}}, {{"version": "1.1.0", "sha1": "sha-110"}}]"#
        ))
        .create();
    let _download = server
        .mock("GET", "/d/github.com/cloudfoundry/bpm-release?v=1.2.0")
        .with_status(200)
        .with_body("abc")
        .create();

    let dir = tempdir().unwrap();
    let specfile = write_tile(
        dir.path(),
        &bosh_io_tile(&url),
        &format!(
            r#"
releases:
  - name: bpm
    version: 1.1.0
    sha1: sha-110
    remote_source: bosh.io
    remote_path: {url}/d/github.com/cloudfoundry/bpm-release?v=1.1.0
stemcell_criteria:
  os: ubuntu-jammy
  version: "1.44"
"#
        ),
    );
    let releases = dir.path().join("releases");

    relfetch(&specfile)
        .arg("update-release")
        .arg("--name")
        .arg("bpm")
        .arg("--version")
        .arg("1.2.0")
        .arg("--releases-directory")
        .arg(&releases)
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated bpm to 1.2.0"));

    let lock = std::fs::read_to_string(dir.path().join("Tilefile.lock")).unwrap();
    assert!(lock.contains("version: 1.2.0"));
    assert!(lock.contains(ABC_SHA1));
    assert!(lock.contains("bpm-release?v=1.2.0"));
    assert!(lock.contains("os: ubuntu-jammy"));
    assert!(releases.join("bpm-1.2.0.tgz").exists());
}

fn write_release_tarball(path: &Path, name: &str, version: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut tar = tar::Builder::new(flate2::write::GzEncoder::new(
        file,
        flate2::Compression::default(),
    ));
    let manifest = format!("name: {name}\nversion: {version}\n");
    let mut header = tar::Header::new_gnu();
    header.set_path("./release.MF").unwrap();
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append(&header, manifest.as_bytes()).unwrap();
    tar.into_inner().unwrap().finish().unwrap();
}

#[test]
fn test_upload_release_to_artifactory() {
    let mut server = Server::new();
    let url = server.url();

    let _info = server
        .mock("GET", "/api/storage/basket/bpm/bpm-1.2.3.tgz")
        .with_status(404)
        .create();
    let upload = server
        .mock("PUT", "/artifactory/basket/bpm/bpm-1.2.3.tgz")
        .match_header("x-checksum-sha1", mockito::Matcher::Regex("^[0-9a-f]{40}$".into()))
        .with_status(201)
        .expect(1)
        .create();

    let dir = tempdir().unwrap();
    let specfile = write_tile(
        dir.path(),
        &format!(
            r#"
release_sources:
  - type: artifactory
    id: build
    artifactory_host: {url}
    repo: basket
    username: builder
    password: secret
    path_template: "{{{{.Name}}}}/{{{{.Name}}}}-{{{{.Version}}}}.tgz"
releases:
  - name: bpm
"#
        ),
        "releases: []\n",
    );
    let tarball = dir.path().join("bpm.tgz");
    write_release_tarball(&tarball, "bpm", "1.2.3");

    relfetch(&specfile)
        .arg("upload-release")
        .arg("--upload-target-id")
        .arg("build")
        .arg("--local-path")
        .arg(&tarball)
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded bpm 1.2.3 to bpm/bpm-1.2.3.tgz"));
    upload.assert();
}

#[test]
fn test_unreachable_store_mentions_connectivity() {
    let dir = tempdir().unwrap();
    let specfile = write_tile(dir.path(), &bosh_io_tile("http://127.0.0.1:1"), "releases: []\n");

    relfetch(&specfile)
        .arg("find-release-version")
        .arg("--release")
        .arg("bpm")
        .assert()
        .failure()
        .stderr(predicate::str::contains("VPN"));
}
