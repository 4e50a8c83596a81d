// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Raven

use thiserror::Error;

/// Result type alias for Raven operations
pub type Result<T> = std::result::Result<T, RavenError>;

/// Raven error types
#[derive(Error, Debug)]
pub enum RavenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Speech recognition error: {0}")]
    Recognition(String),

    #[error("System error: {0}")]
    System(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Process {0} not found")]
    ProcessNotFound(u32),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Busy: {0}")]
    Busy(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
