// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Opening and closing applications

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Request, Skill, SkillContext};
use crate::launcher::find_app;
use crate::nlu::{Entities, Intent};
use crate::Result;

const SHUTDOWN_VERBS: &[&str] = &["выключи", "shutdown", "shut down", "power off", "turn off"];
const COMPUTER_WORDS: &[&str] = &["компьютер", "пк", "computer", "pc"];

/// Starts catalog applications or opens a mentioned URL
pub struct AppLauncherSkill;

#[async_trait]
impl Skill for AppLauncherSkill {
    fn name(&self) -> &'static str {
        "app_launcher"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        intent == Intent::Open
    }

    async fn handle(&self, request: &Request<'_>, ctx: &SkillContext) -> Result<String> {
        if let Some(url) = request.entities.urls.first() {
            let target = if url.starts_with("www.") {
                format!("https://{}", url)
            } else {
                url.clone()
            };
            return Ok(match ctx.launcher.open_url(&target) {
                Ok(()) => format!("Opening {}", target),
                Err(e) => format!("Could not open {}: {}", target, e),
            });
        }

        let Some(name) = request.entities.applications.first() else {
            return Ok("Which application should I open?".to_string());
        };
        let Some(app) = find_app(&ctx.apps, name) else {
            return Ok(format!("I don't know how to start {}", name));
        };

        match ctx.launcher.launch(app) {
            Ok(()) => {
                info!("Launched {}", app.name);
                Ok(format!("Opening {}", app.name))
            }
            Err(e) => {
                warn!("Failed to launch {}: {}", app.name, e);
                Ok(format!("Could not start {}: {}", app.name, e))
            }
        }
    }
}

/// Terminates the processes belonging to a catalog application
pub struct AppCloserSkill;

#[async_trait]
impl Skill for AppCloserSkill {
    fn name(&self) -> &'static str {
        "app_closer"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        intent == Intent::Close
    }

    async fn handle(&self, request: &Request<'_>, ctx: &SkillContext) -> Result<String> {
        let normalized = &request.normalized;
        if normalized.matches_any(SHUTDOWN_VERBS) && normalized.matches_any(COMPUTER_WORDS) {
            // Never acted on without an explicit confirmation step.
            return Ok("Shutting down the computer requires confirmation. \
                       Please do it manually for now."
                .to_string());
        }

        let Some(name) = request.entities.applications.first() else {
            return Ok("Please specify which application to close.".to_string());
        };
        let Some(app) = find_app(&ctx.apps, name) else {
            return Ok(format!("I don't know how to close {}", name));
        };

        let probe = Arc::clone(&ctx.probe);
        let patterns = app.process_names.clone();
        let closed = tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut closed = 0;
            for pattern in &patterns {
                for process in probe.find_processes(pattern)? {
                    match probe.terminate(process.pid) {
                        Ok(_) => closed += 1,
                        Err(e) => warn!("Could not terminate {}: {}", process.pid, e),
                    }
                }
            }
            Ok(closed)
        })
        .await??;

        if closed > 0 {
            info!("Closed {} ({} processes)", app.name, closed);
            Ok(format!("Closed {}", app.name))
        } else {
            Ok(format!("{} doesn't seem to be running", app.name))
        }
    }
}

/// Asks what to do when an application is mentioned without a verb
pub struct AppHintSkill;

#[async_trait]
impl Skill for AppHintSkill {
    fn name(&self) -> &'static str {
        "application_hint"
    }

    fn handles(&self, intent: Intent, entities: &Entities) -> bool {
        intent == Intent::Unknown && !entities.applications.is_empty()
    }

    async fn handle(&self, request: &Request<'_>, _ctx: &SkillContext) -> Result<String> {
        let name = request
            .entities
            .applications
            .first()
            .map(String::as_str)
            .unwrap_or("it");
        Ok(format!("Do you want me to open or close {}?", name))
    }

    fn priority(&self) -> u8 {
        40
    }
}
