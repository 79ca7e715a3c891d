//! tumblrzip server: back up a blog per request and stream it as a zip.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tumblrzip::engine::Cli;
use tumblrzip::engine::handle_run;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Uptime: {:?}", start_time.elapsed());
    Ok(())
}
