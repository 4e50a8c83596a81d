// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Raven Web Dashboard
//!
//! Standalone server for the Raven dashboard and JSON API.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use raven::config::AppConfig;
use raven::launcher::{Launcher, OsLauncher};
use raven::{logging, Result};

#[derive(Parser, Debug)]
#[command(name = "raven-server")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Raven Web Dashboard Server")]
struct Args {
    /// Path to settings file
    #[arg(short, long, default_value = "config/settings.json")]
    config: PathBuf,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Open browser automatically
    #[arg(long)]
    open: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    let _log_guard = logging::init(args.verbose.then_some("debug"), &config);

    info!("Raven Web Dashboard v{}", env!("CARGO_PKG_VERSION"));

    // Apply CLI overrides
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if args.open {
        let url = format!("http://{}:{}", config.server.host, config.server.port);
        if let Err(e) = OsLauncher.open_url(&url) {
            error!("Failed to open browser: {}", e);
        }
    }

    raven::web::start_server(config, Some(args.config)).await
}
