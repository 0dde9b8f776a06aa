//! Writing release artifacts to disk and checksumming them.

use anyhow::{Context, Result, bail};
use futures_util::{StreamExt, TryStreamExt, stream};
use log::{debug, info};
use reqwest::RequestBuilder;
use sha1::{Digest, Sha1};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, SeekFrom};

use crate::http::HttpClient;

/// Parallel part requests used for ranged downloads unless configured otherwise.
pub const DEFAULT_DOWNLOAD_THREADS: usize = 5;

/// Size of one ranged part.
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Value of the `Range` header for an inclusive byte range.
pub fn range_header(start: u64, end: u64) -> String {
    format!("bytes={}-{}", start, end)
}

/// Lower-case hex SHA-1 of a byte slice.
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Writer that keeps only the SHA-1 of what passes through it.
///
/// Used to checksum a remote artifact without keeping a copy.
#[derive(Default)]
pub struct Sha1Sink {
    hasher: Sha1,
}

impl Sha1Sink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hex_digest(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl AsyncWrite for Sha1Sink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.hasher.update(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Re-reads a file from disk and returns its SHA-1.
#[tracing::instrument]
pub async fn sha1_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {:?} for checksum", path))?;
    sha1_reader(&mut file, path).await
}

async fn sha1_reader(file: &mut File, path: &Path) -> Result<String> {
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Streams a response body into `path` and returns the SHA-1 of what landed on disk.
#[tracing::instrument(skip(http, request))]
pub async fn download_file(
    http: &HttpClient,
    request: RequestBuilder,
    path: &Path,
) -> Result<String> {
    info!("Downloading {:?}...", path);

    let mut file = create_file(path).await?;
    http.download_to(request, &mut file).await?;

    let sum = checksum_written(&mut file, path).await?;
    info!("Download of {:?} complete.", path);
    Ok(sum)
}

/// Downloads `total_size` bytes in parallel byte ranges and returns the file's SHA-1.
///
/// `make_request(start, end)` builds the request for the inclusive range,
/// including its `Range` header (see [`range_header`]).
#[tracing::instrument(skip(http, make_request))]
pub async fn download_ranges<F>(
    http: &HttpClient,
    path: &Path,
    total_size: u64,
    part_size: u64,
    threads: usize,
    make_request: F,
) -> Result<String>
where
    F: Fn(u64, u64) -> Result<RequestBuilder>,
{
    info!("Downloading {:?} ({} bytes)...", path, total_size);

    let mut file = create_file(path).await?;
    file.set_len(total_size)
        .await
        .with_context(|| format!("Failed to allocate {:?}", path))?;

    let part_size = part_size.max(1);
    let ranges: Vec<(u64, u64)> = (0..total_size)
        .step_by(part_size as usize)
        .map(|start| (start, (start + part_size).min(total_size) - 1))
        .collect();
    debug!("Fetching {} parts with {} threads", ranges.len(), threads);

    let requests = ranges
        .into_iter()
        .map(|(start, end)| Ok::<_, anyhow::Error>((start, end, make_request(start, end)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut parts = stream::iter(requests)
        .map(|(start, end, request)| async move {
            let body = http.send_ok(request).await?.bytes().await.with_context(|| {
                format!("Failed to read bytes {}-{} of {:?}", start, end, path)
            })?;
            if body.len() as u64 != end - start + 1 {
                bail!(
                    "expected {} bytes for range {}-{}, got {}",
                    end - start + 1,
                    start,
                    end,
                    body.len()
                );
            }
            Ok::<_, anyhow::Error>((start, body))
        })
        .buffer_unordered(threads.max(1));

    while let Some((offset, body)) = parts.try_next().await? {
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(&body)
            .await
            .with_context(|| format!("Failed to write to {:?}", path))?;
    }

    let sum = checksum_written(&mut file, path).await?;
    info!("Download of {:?} complete.", path);
    Ok(sum)
}

async fn create_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create file at {:?}", path))
}

async fn checksum_written(file: &mut File, path: &Path) -> Result<String> {
    file.flush().await?;
    file.seek(SeekFrom::Start(0))
        .await
        .with_context(|| format!("Failed to rewind {:?}", path))?;
    sha1_reader(file, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use tempfile::tempdir;

    const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn test_sha1_hex() {
        assert_eq!(sha1_hex(b""), EMPTY_SHA1);
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[tokio::test]
    async fn test_sha1_sink() {
        let mut sink = Sha1Sink::new();
        sink.write_all(b"a").await.unwrap();
        sink.write_all(b"bc").await.unwrap();
        assert_eq!(sink.hex_digest(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[tokio::test]
    async fn test_download_file_checksums_local_copy() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bpm-1.2.3.tgz")
            .with_status(200)
            .with_body("abc")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("bpm-1.2.3.tgz");
        let http = HttpClient::new(Client::new());
        let sum = download_file(
            &http,
            http.inner().get(format!("{}/bpm-1.2.3.tgz", server.url())),
            &path,
        )
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(sum, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        assert_eq!(sha1_file(&path).await.unwrap(), sum);
    }

    #[tokio::test]
    async fn test_download_file_not_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing.tgz")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let http = HttpClient::new(Client::new());
        let result = download_file(
            &http,
            http.inner().get(format!("{}/missing.tgz", server.url())),
            &dir.path().join("missing.tgz"),
        )
        .await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_download_ranges_reassembles_parts() {
        let mut server = mockito::Server::new_async().await;
        let content = b"0123456789";
        let mut mocks = Vec::new();
        for (start, end) in [(0usize, 3usize), (4, 7), (8, 9)] {
            mocks.push(
                server
                    .mock("GET", "/blob")
                    .match_header("range", format!("bytes={}-{}", start, end).as_str())
                    .with_status(206)
                    .with_body(&content[start..=end])
                    .create_async()
                    .await,
            );
        }

        let dir = tempdir().unwrap();
        let path = dir.path().join("blob");
        let http = HttpClient::new(Client::new());
        let url = format!("{}/blob", server.url());
        let sum = download_ranges(&http, &path, 10, 4, 2, |start, end| {
            Ok(http
                .inner()
                .get(&url)
                .header(reqwest::header::RANGE, range_header(start, end)))
        })
        .await
        .unwrap();

        for mock in mocks {
            mock.assert_async().await;
        }
        assert_eq!(std::fs::read(&path).unwrap(), content);
        assert_eq!(sum, sha1_hex(content));
    }

    #[tokio::test]
    async fn test_download_ranges_rejects_short_part() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/blob")
            .with_status(206)
            .with_body("01")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let http = HttpClient::new(Client::new());
        let url = format!("{}/blob", server.url());
        let result = download_ranges(&http, &dir.path().join("blob"), 4, 4, 1, |_, _| {
            Ok(http.inner().get(&url))
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_download_ranges_empty_object() {
        let dir = tempdir().unwrap();
        let http = HttpClient::new(Client::new());
        let path = dir.path().join("empty");
        let sum = download_ranges(&http, &path, 0, 4, 3, |_, _| {
            Ok(http.inner().get("http://127.0.0.1:1/never"))
        })
        .await
        .unwrap();
        assert_eq!(sum, EMPTY_SHA1);
    }
}
