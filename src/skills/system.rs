// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Spoken system status

use async_trait::async_trait;
use std::sync::Arc;

use super::{Request, Skill, SkillContext};
use crate::nlu::{Entities, Intent};
use crate::Result;

pub struct SystemMonitorSkill;

#[async_trait]
impl Skill for SystemMonitorSkill {
    fn name(&self) -> &'static str {
        "system_monitor"
    }

    fn handles(&self, intent: Intent, _entities: &Entities) -> bool {
        intent == Intent::System
    }

    async fn handle(&self, _request: &Request<'_>, ctx: &SkillContext) -> Result<String> {
        let probe = Arc::clone(&ctx.probe);
        let snapshot = tokio::task::spawn_blocking(move || probe.snapshot()).await??;

        Ok(format!(
            "System status: CPU {:.1}%, RAM {:.1}%, disk {:.1}%, {} processes running",
            snapshot.cpu_percent, snapshot.ram_percent, snapshot.disk_percent, snapshot.processes
        ))
    }
}
