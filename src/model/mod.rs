//! Release specifications, locks and the files that carry them.

mod files;
mod lock;
mod spec;
mod store_config;
pub mod version;

pub use files::{Lockfile, Specfile, StemcellCriteria};
pub use lock::{CHECKSUM_NOT_CALCULATED, ComponentLock, LocalLock};
pub use spec::ComponentSpec;
pub use store_config::{StoreConfig, StoreType};
pub use version::{VersionConstraint, parse_version};
