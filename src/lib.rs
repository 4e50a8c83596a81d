// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Raven: Local Voice Assistant
//!
//! Keyword-driven command dispatch with speech input/output, system
//! monitoring and a web dashboard.

pub mod assistant;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod launcher;
pub mod logging;
pub mod nlu;
pub mod skills;
pub mod speech;
pub mod system;
pub mod text_tools;
pub mod voice;
pub mod web;

pub use assistant::{Assistant, Reply};
pub use config::AppConfig;
pub use error::{RavenError, Result};
