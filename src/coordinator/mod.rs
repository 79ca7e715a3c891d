//! Per-key cycle coordination: locks, workspace lifecycle, backup job, zip streaming.

pub mod archive;
pub mod extract;
pub mod locks;
pub mod request;
pub mod workspace;

pub use archive::{ArchiveError, ChannelWriter, write_zip};
pub use extract::{CancelSignal, ExtractError, ExtractionInvoker};
pub use locks::{KeyLockGuard, KeyLockRegistry};
pub use request::{ArchiveDownload, RequestCoordinator, RequestError};
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};
