//! Application configuration constants.
//! Defaults and limits in one place.

use std::sync::OnceLock;

// ---- Package / names (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                env_prefix: pkg.to_uppercase(),
            }
        })
    }

    /// Environment variable name for a config field, e.g. `TUMBLRZIP_HOSTNAME`.
    pub fn env_var(&self, field: &str) -> String {
        format!("{}_{}", self.env_prefix, field.to_uppercase())
    }
}

// ---- Server ----

/// Defaults for fields missing from the config file.
pub struct ServerDefaults;

impl ServerDefaults {
    pub const CONFIG_FILE: &'static str = "config.json";
    pub const PORT: u16 = 8080;
    pub const WORKSPACE_ROOT: &'static str = ".";
    pub const EXTRACTOR_PROGRAM: &'static str = "python";
    pub const EXTRACTOR_SCRIPT: &'static str = "tumblr-utils/tumblr_backup.py";
    /// Route of the single download endpoint.
    pub const DOWNLOAD_ROUTE: &'static str = "/download";
}

// ---- Archive streaming ----

/// Chunking between the zip encoder thread and the response body.
pub struct ArchiveConsts;

impl ArchiveConsts {
    /// Bytes buffered before a chunk is handed to the body (64 KiB).
    pub const CHUNK_SIZE: usize = 64 * 1024;
    /// Default number of in-flight chunks between encoder and socket.
    pub const CHANNEL_CHUNKS: usize = 16;
    /// Files at or above this size are written with zip64 headers.
    pub const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;
}

// ---- Extraction ----

/// Bytes of the backup job's stderr kept for error messages.
pub const STDERR_TAIL_BYTES: usize = 2048;
