//! Typed errors for conditions callers match on.
//!
//! Everything else travels as `anyhow::Error`; these variants can be recovered
//! from one with `downcast_ref`.

use thiserror::Error;

use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to find release matching {name} {constraint} in any of the release sources: {sources:?}")]
    NotFound {
        name: String,
        constraint: String,
        sources: Vec<String>,
    },

    #[error(
        "could not reach {url}: {source}. The host may only be reachable on a corporate VPN or behind a firewall"
    )]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response status {status} from {method} {url}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
    },

    #[error("invalid release source configuration: {0}")]
    Configuration(String),

    #[error(
        "release_sources must have unique IDs; items at index {first} and {second} both have ID {id:?}"
    )]
    DuplicateId {
        first: usize,
        second: usize,
        id: String,
    },

    #[error("couldn't find a release source with ID {id:?}. Available choices: {available:?}")]
    UnknownSource { id: String, available: Vec<String> },

    #[error("{0}")]
    Unsupported(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Whether an error chain carries a [`StoreError::NotFound`].
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { .. })
        )
    })
}
