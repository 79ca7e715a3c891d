//! Public types for the server API.

use std::path::PathBuf;
use std::time::Duration;

use crate::utils::config::{ArchiveConsts, ServerDefaults};

/// Process-wide settings. Built once before the listener binds; read-only afterwards.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host the listener binds to (and the name the service is reached by).
    pub hostname: String,
    pub port: u16,
    /// Directory key workspaces are created in; the backup job runs here.
    pub workspace_root: PathBuf,
    /// Backup job executable.
    pub extractor_program: String,
    /// Arguments placed before the key.
    pub extractor_args: Vec<String>,
    /// Upper bound on lock wait + extraction. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// In-flight body chunks between the zip encoder and the socket.
    pub archive_channel_chunks: usize,
    /// Debug logging.
    pub verbose: bool,
}

impl ServerConfig {
    /// Config with every field except `hostname` at its default.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: ServerDefaults::PORT,
            workspace_root: PathBuf::from(ServerDefaults::WORKSPACE_ROOT),
            extractor_program: ServerDefaults::EXTRACTOR_PROGRAM.to_string(),
            extractor_args: vec![ServerDefaults::EXTRACTOR_SCRIPT.to_string()],
            request_timeout: None,
            archive_channel_chunks: ArchiveConsts::CHANNEL_CHUNKS,
            verbose: false,
        }
    }
}
