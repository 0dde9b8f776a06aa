//! Response status and transport error classification.

use anyhow::anyhow;
use reqwest::{Method, Response, StatusCode};

use crate::error::StoreError;

/// Maps a send failure to a typed error.
///
/// Connection-level failures (DNS, refused, TLS) become [`StoreError::Connectivity`]
/// so callers can tell an unreachable store from a bad response.
pub fn classify_send_error(url: &str, error: reqwest::Error) -> anyhow::Error {
    if error.is_connect() || error.is_timeout() {
        StoreError::Connectivity {
            url: url.to_string(),
            source: error,
        }
        .into()
    } else {
        anyhow!(error).context(format!("request to {} failed", url))
    }
}

/// Whether the store answered "no such object".
pub fn is_not_found(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND
}

/// Rejects any non-2xx response.
pub fn check_status(method: &Method, response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(unexpected_status(method, response.url().as_str(), status))
    }
}

pub fn unexpected_status(method: &Method, url: &str, status: StatusCode) -> StoreError {
    StoreError::UnexpectedStatus {
        method: method.to_string(),
        url: url.to_string(),
        status: status.as_u16(),
    }
}
