//! Thin reqwest wrapper shared by every store adapter.

use anyhow::{Context, Result};
use log::debug;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::status::{check_status, classify_send_error, is_not_found, unexpected_status};

/// HTTP client that turns transport and status failures into typed errors.
///
/// Requests are attempted once; there is no retry loop.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Sends a request, mapping connection failures but leaving the status untouched.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let (_, response) = self.send_with_method(request).await?;
        Ok(response)
    }

    /// Sends a request and fails on any non-2xx status.
    pub async fn send_ok(&self, request: RequestBuilder) -> Result<Response> {
        let (method, response) = self.send_with_method(request).await?;
        Ok(check_status(&method, response)?)
    }

    /// Sends a request; 404 becomes `None`, other non-2xx statuses are errors.
    pub async fn send_optional(&self, request: RequestBuilder) -> Result<Option<Response>> {
        let (method, response) = self.send_with_method(request).await?;
        if is_not_found(response.status()) {
            return Ok(None);
        }
        Ok(Some(check_status(&method, response)?))
    }

    /// GETs a JSON document; 404 becomes `None`.
    #[tracing::instrument(skip(self))]
    pub async fn get_json_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        match self.send_optional(self.client.get(url)).await? {
            Some(response) => {
                let parsed = response
                    .json::<T>()
                    .await
                    .with_context(|| format!("Failed to parse JSON response from {}", url))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// GETs a JSON document; any non-2xx status is an error.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send_ok(self.client.get(url)).await?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    /// Streams a successful response body into `writer`, returning the byte count.
    #[tracing::instrument(skip(self, request, writer))]
    pub async fn download_to<W>(&self, request: RequestBuilder, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut response = self.send_ok(request).await?;
        let mut downloaded_bytes: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read chunk from download stream")?
        {
            writer
                .write_all(&chunk)
                .await
                .context("Failed to write chunk to file")?;
            downloaded_bytes += chunk.len() as u64;
        }
        writer.flush().await.context("Failed to flush download")?;

        debug!(
            "Downloaded {:.2} MB",
            downloaded_bytes as f64 / (1024.0 * 1024.0)
        );

        Ok(downloaded_bytes)
    }

    async fn send_with_method(&self, request: RequestBuilder) -> Result<(Method, Response)> {
        let request = request.build().context("Failed to build request")?;
        let method = request.method().clone();
        let url = request.url().to_string();
        debug!("{} {}", method, url);
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| classify_send_error(&url, e))?;
        Ok((method, response))
    }
}

/// Error for a response whose status the caller did not expect even though it was 2xx.
pub fn expect_status(method: &Method, response: &Response, expected: u16) -> Result<()> {
    if response.status().as_u16() == expected {
        Ok(())
    } else {
        Err(unexpected_status(method, response.url().as_str(), response.status()).into())
    }
}
