// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Tracing setup: console output plus an optional daily log file

use std::path::Path;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::AppConfig;

const LOG_FILE: &str = "raven.log";

/// Map a settings level name (`INFO`, `WARNING`, ...) to a tracing directive
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        "off" => "off",
        _ => "info",
    }
}

/// Install the global subscriber. `cli_level` overrides the configured
/// level; `RUST_LOG` overrides both. Keep the returned guard alive so the
/// file writer flushes on exit.
pub fn init(cli_level: Option<&str>, config: &AppConfig) -> Option<WorkerGuard> {
    let level = cli_level.unwrap_or_else(|| level_directive(&config.system.log_level));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut file_error = None;
    let mut guard = None;
    let file_layer = if config.system.save_logs {
        let dir = Path::new(&config.paths.log_dir);
        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
                let (writer, worker_guard) = tracing_appender::non_blocking(appender);
                guard = Some(worker_guard);
                Some(fmt::layer().with_ansi(false).with_target(false).with_writer(writer))
            }
            Err(e) => {
                file_error = Some(e);
                None
            }
        }
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .is_ok();

    if let Some(e) = file_error {
        warn!("File logging disabled, cannot create {}: {}", config.paths.log_dir, e);
    }

    if installed {
        guard
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("INFO"), "info");
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("Critical"), "error");
        assert_eq!(level_directive("debug"), "debug");
        assert_eq!(level_directive("nonsense"), "info");
    }
}
