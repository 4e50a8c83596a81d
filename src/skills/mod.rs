// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Skills turn a classified message into a reply

pub mod apps;
pub mod conversation;
pub mod datetime;
pub mod knowledge;
pub mod search;
pub mod system;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::AppEntry;
use crate::launcher::Launcher;
use crate::nlu::{normalize, Entities, Intent, Normalized};
use crate::system::SystemProbe;
use crate::Result;

/// A message after classification
pub struct Request<'a> {
    /// Original text as typed or recognized
    pub text: &'a str,
    pub normalized: Normalized,
    pub intent: Intent,
    pub entities: &'a Entities,
}

impl<'a> Request<'a> {
    pub fn new(text: &'a str, intent: Intent, entities: &'a Entities) -> Self {
        Self {
            text,
            normalized: normalize(text),
            intent,
            entities,
        }
    }
}

/// What skills may touch
pub struct SkillContext {
    pub probe: Arc<dyn SystemProbe>,
    pub launcher: Arc<dyn Launcher>,
    pub apps: Vec<AppEntry>,
    pub search_url: String,
}

/// Trait for assistant skills
#[async_trait]
pub trait Skill: Send + Sync {
    /// Name reported in replies
    fn name(&self) -> &'static str;

    /// Whether this skill answers the given intent
    fn handles(&self, intent: Intent, entities: &Entities) -> bool;

    /// Produce the reply text
    async fn handle(&self, request: &Request<'_>, ctx: &SkillContext) -> Result<String>;

    /// Priority (higher = preferred when multiple skills match)
    fn priority(&self) -> u8 {
        50
    }
}

/// Registry of all skills
pub struct SkillRegistry {
    skills: Vec<Box<dyn Skill>>,
    fallback: knowledge::GeneralSkill,
}

impl SkillRegistry {
    /// Create a new registry with the built-in skills
    pub fn new() -> Self {
        let mut registry = Self {
            skills: Vec::new(),
            fallback: knowledge::GeneralSkill,
        };

        registry.register(Box::new(conversation::ConversationSkill));
        registry.register(Box::new(knowledge::HelpSkill));
        registry.register(Box::new(system::SystemMonitorSkill));
        registry.register(Box::new(datetime::DateTimeSkill));
        registry.register(Box::new(search::WebSearchSkill));
        registry.register(Box::new(apps::AppLauncherSkill));
        registry.register(Box::new(apps::AppCloserSkill));
        registry.register(Box::new(knowledge::WeatherSkill));
        registry.register(Box::new(knowledge::EntertainmentSkill));
        registry.register(Box::new(knowledge::KnowledgeSkill));
        registry.register(Box::new(apps::AppHintSkill));

        registry
    }

    /// Register a new skill
    pub fn register(&mut self, skill: Box<dyn Skill>) {
        self.skills.push(skill);
        self.skills.sort_by_key(|s| std::cmp::Reverse(s.priority()));
    }

    /// Find the skill for an intent, falling back to the general one
    pub fn find_skill(&self, intent: Intent, entities: &Entities) -> &dyn Skill {
        self.skills
            .iter()
            .find(|s| s.handles(intent, entities))
            .map(|s| s.as_ref())
            .unwrap_or(&self.fallback)
    }

    /// Get skill names
    pub fn skill_names(&self) -> Vec<&'static str> {
        self.skills.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Doubles for the OS seams

    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::system::{
        CpuMetrics, NetworkMetrics, ProcessInfo, ProcessSort, SystemInfo, SystemMetrics,
        SystemSnapshot, UsageMetrics,
    };
    use crate::{AppConfig, RavenError};

    #[derive(Default)]
    pub struct FakeProbe {
        pub processes: Mutex<Vec<ProcessInfo>>,
        pub terminated: Mutex<Vec<u32>>,
    }

    impl FakeProbe {
        pub fn with_processes(names: &[&str]) -> Self {
            let processes = names
                .iter()
                .enumerate()
                .map(|(i, name)| ProcessInfo {
                    pid: 100 + i as u32,
                    name: name.to_string(),
                    cpu: i as f64,
                    memory: 1.0,
                    status: "Run".to_string(),
                    memory_bytes: 1024,
                })
                .collect();
            Self {
                processes: Mutex::new(processes),
                terminated: Mutex::new(Vec::new()),
            }
        }
    }

    fn usage(percent: f64) -> UsageMetrics {
        UsageMetrics { percent, total_gb: 16.0, used_gb: 4.0, free_gb: 12.0 }
    }

    impl SystemProbe for FakeProbe {
        fn snapshot(&self) -> Result<SystemSnapshot> {
            Ok(SystemSnapshot {
                cpu_percent: 12.5,
                ram_percent: 40.0,
                disk_percent: 70.0,
                processes: self.processes.lock().unwrap().len(),
                timestamp: Utc::now(),
            })
        }

        fn metrics(&self) -> Result<SystemMetrics> {
            Ok(SystemMetrics {
                cpu: CpuMetrics { percent: 12.5, cores: 8, frequency: Some(3200) },
                ram: usage(40.0),
                disk: usage(70.0),
                processes: self.processes.lock().unwrap().len(),
                network: NetworkMetrics { bytes_sent: 10, bytes_recv: 20 },
                timestamp: Utc::now(),
            })
        }

        fn processes(&self, sort: ProcessSort, limit: usize) -> Result<Vec<ProcessInfo>> {
            let mut list = self.processes.lock().unwrap().clone();
            crate::system::sort_processes(&mut list, sort, limit);
            Ok(list)
        }

        fn system_info(&self) -> Result<SystemInfo> {
            Ok(SystemInfo {
                hostname: "test-host".to_string(),
                username: "tester".to_string(),
                os: "TestOS".to_string(),
                os_version: "1.0".to_string(),
                architecture: "x86_64".to_string(),
                kernel: "6.0".to_string(),
                boot_time: "2025-01-01 00:00:00".to_string(),
            })
        }

        fn find_processes(&self, fragment: &str) -> Result<Vec<ProcessInfo>> {
            let needle = fragment.to_lowercase();
            Ok(self
                .processes
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.name.to_lowercase().contains(&needle))
                .cloned()
                .collect())
        }

        fn terminate(&self, pid: u32) -> Result<String> {
            let mut processes = self.processes.lock().unwrap();
            let idx = processes
                .iter()
                .position(|p| p.pid == pid)
                .ok_or(RavenError::ProcessNotFound(pid))?;
            let removed = processes.remove(idx);
            self.terminated.lock().unwrap().push(pid);
            Ok(removed.name)
        }

        fn own_memory_mb(&self) -> Result<f64> {
            Ok(42.0)
        }
    }

    #[derive(Default)]
    pub struct FakeLauncher {
        pub calls: Mutex<Vec<String>>,
    }

    impl Launcher for FakeLauncher {
        fn open_url(&self, url: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("url:{}", url));
            Ok(())
        }

        fn spawn(&self, program: &str, args: &[String]) -> Result<()> {
            let mut call = format!("spawn:{}", program);
            for arg in args {
                call.push(' ');
                call.push_str(arg);
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    pub fn context(probe: Arc<FakeProbe>, launcher: Arc<FakeLauncher>) -> SkillContext {
        let config = AppConfig::default();
        SkillContext {
            probe,
            launcher,
            apps: config.resolved_apps(),
            search_url: config.ai.search_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_routes_intents() {
        let registry = SkillRegistry::new();
        let none = Entities::default();
        assert_eq!(registry.find_skill(Intent::Greeting, &none).name(), "conversation");
        assert_eq!(registry.find_skill(Intent::System, &none).name(), "system_monitor");
        assert_eq!(registry.find_skill(Intent::Open, &none).name(), "app_launcher");
        assert_eq!(registry.find_skill(Intent::Unknown, &none).name(), "general");

        let with_app = Entities {
            applications: vec!["notepad".to_string()],
            ..Entities::default()
        };
        assert_eq!(registry.find_skill(Intent::Unknown, &with_app).name(), "application_hint");
    }

    #[test]
    fn test_registry_orders_by_priority() {
        let registry = SkillRegistry::new();
        assert_eq!(registry.len(), 11);
        assert_eq!(registry.skill_names().last(), Some(&"application_hint"));
    }
}
