//! Application layer - the operations the command line drives.
//!
//! Each use case loads nothing itself; callers hand in the parsed spec and
//! lock files and a ready [`ReleaseSourceList`](crate::source::ReleaseSourceList).

mod fetch;
mod find_version;
mod update;
mod upload;

pub use fetch::{FetchReport, fetch};
pub use find_version::{ReleaseVersionOutput, find_release_version};
pub use update::{UpdateOutcome, UpdateRequest, update_release};
pub use upload::upload_release;
