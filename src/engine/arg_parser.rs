use clap::Parser;
use std::path::PathBuf;

use crate::utils::config::ServerDefaults;

/// Runs a blog backup per request and streams the result back as a zip.
#[derive(Clone, Parser)]
#[command(name = "tumblrzip")]
#[command(about = "Serve GET /download?tumblr=<name>: back up <name>, stream it as a zip, clean up.")]
pub struct Cli {
    /// Config file (JSON, or TOML when it ends in .toml). Must exist.
    #[arg(long, short, value_name = "PATH", default_value = ServerDefaults::CONFIG_FILE)]
    pub config: PathBuf,

    /// Host to bind. Overrides config and TUMBLRZIP_HOSTNAME.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Port to bind. Overrides config and TUMBLRZIP_PORT.
    #[arg(long, short = 'p', value_parser = clap::value_parser!(u16))]
    pub port: Option<u16>,

    /// Directory workspaces are created in; the backup job runs here.
    #[arg(long, short = 'w', value_name = "DIR")]
    pub workspace_root: Option<PathBuf>,

    /// Seconds a request may spend waiting for its name and running the backup job.
    #[arg(long, short = 't', value_name = "SECS", value_parser = clap::value_parser!(u64))]
    pub timeout: Option<u64>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}
