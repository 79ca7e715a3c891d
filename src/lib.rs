//! tumblrzip: run a blog backup per request, stream the directory back as a zip, clean up.
//!
//! At most one backup cycle runs per blog name at a time; different names run in parallel.

pub mod coordinator;
pub mod engine;
pub mod key;
pub mod server;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use key::{KEY_PATTERN, Key, KeyError};
pub use types::*;

pub use coordinator::{ArchiveDownload, RequestCoordinator, RequestError};

/// Result alias used by the startup / CLI paths
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
