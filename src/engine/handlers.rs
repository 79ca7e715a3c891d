//! CLI command handler: load config, serve until Ctrl-C.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::time::Duration;

use crate::ServerConfig;
use crate::engine::arg_parser::Cli;
use crate::server;
use crate::utils::{load_server_config, setup_logging};

/// Apply CLI flags over a config loaded from file and env.
fn apply_cli_to_config(cli: &Cli, cfg: &mut ServerConfig) {
    if let Some(ref host) = cli.hostname {
        cfg.hostname = host.clone();
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if let Some(ref root) = cli.workspace_root {
        cfg.workspace_root = root.clone();
    }
    if let Some(secs) = cli.timeout {
        cfg.request_timeout = Some(Duration::from_secs(secs));
    }
    if let Some(v) = cli.verbose {
        cfg.verbose = v;
    }
}

/// Build the effective config. Any error here is fatal to the process.
pub fn setup_config(cli: &Cli) -> Result<ServerConfig> {
    let mut cfg = load_server_config(&cli.config)?;
    apply_cli_to_config(cli, &mut cfg);
    if !cfg.workspace_root.is_dir() {
        anyhow::bail!(
            "workspace root {} is not a directory",
            cfg.workspace_root.display()
        );
    }
    Ok(cfg)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, finishing in-flight downloads"),
        Err(e) => warn!("couldn't listen for Ctrl-C: {}", e),
    }
}

/// Load config, start the runtime and serve.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let cfg = setup_config(cli)?;
    setup_logging(cfg.verbose);
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        cfg
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;
    runtime.block_on(async {
        let listener = server::bind(&cfg).await?;
        server::serve(listener, &cfg, shutdown_signal()).await
    })
}
