//! GitHub REST API access: release lookups, listing and asset download.

mod client;
mod repo;
mod types;

#[cfg(test)]
pub use client::MockGetReleases;
pub use client::{DEFAULT_API_URL, GetReleases, GitHub};
pub use repo::GitHubRepo;
pub use types::{Release, ReleaseAsset};
