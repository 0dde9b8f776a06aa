//! HTTP client module with error classification.

mod client;
mod status;

pub use client::{HttpClient, expect_status};
pub use status::{check_status, classify_send_error, is_not_found, unexpected_status};
