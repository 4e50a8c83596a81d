// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! The assistant: classify a message, run the matching skill, remember it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::history::{create_record, History, RingLog};
use crate::launcher::{Launcher, OsLauncher};
use crate::nlu::{self, Emotion, Entities, EntityExtractor, Intent};
use crate::skills::{Request, SkillContext, SkillRegistry};
use crate::speech::Speaker;
use crate::system::{SysinfoProbe, SystemProbe};
use crate::{RavenError, Result};

/// Everything known about one processed message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub query: String,
    pub intent: Intent,
    pub entities: Entities,
    pub skill: String,
    pub response: String,
    pub emotion: Emotion,
    pub timestamp: DateTime<Utc>,
    pub context_id: String,
}

/// One remembered exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextTurn {
    pub query: String,
    pub response: String,
    pub intent: Intent,
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied context sent along with the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

pub struct Assistant {
    registry: SkillRegistry,
    extractor: EntityExtractor,
    skills: SkillContext,
    context: Mutex<RingLog<ContextTurn>>,
    enable_context: bool,
    history: History,
    speaker: Option<Arc<Speaker>>,
    voice_active: AtomicBool,
}

impl Assistant {
    pub fn new(
        config: &AppConfig,
        probe: Arc<dyn SystemProbe>,
        launcher: Arc<dyn Launcher>,
        speaker: Option<Arc<Speaker>>,
    ) -> Self {
        let registry = SkillRegistry::new();
        debug!("Loaded {} skills: {:?}", registry.len(), registry.skill_names());

        Self {
            registry,
            extractor: EntityExtractor::new(&config.apps),
            skills: SkillContext {
                probe,
                launcher,
                apps: config.resolved_apps(),
                search_url: config.ai.search_url.clone(),
            },
            context: Mutex::new(RingLog::new(config.ai.max_context)),
            enable_context: config.ai.enable_context,
            history: History::new(
                config.paths.command_history_file(),
                config.ai.command_history_limit,
            ),
            voice_active: AtomicBool::new(config.voice.enabled && speaker.is_some()),
            speaker,
        }
    }

    /// Assistant wired to the real OS. Must be called inside a tokio runtime.
    pub fn from_config(config: &AppConfig) -> Self {
        let speaker = Arc::new(Speaker::from_config(&config.tts));
        info!("Speech output via {}", speaker.engine_name());
        Self::new(
            config,
            Arc::new(SysinfoProbe::new()),
            Arc::new(OsLauncher),
            Some(speaker),
        )
    }

    fn lock_context(&self) -> MutexGuard<'_, RingLog<ContextTurn>> {
        self.context.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Classify a message and produce a reply. Never fails: skill errors
    /// become an apology in the response.
    pub async fn process_query(&self, text: &str, extra: Option<serde_json::Value>) -> Reply {
        let intent = nlu::detect_intent(text);
        let entities = self.extractor.extract(text);
        let skill = self.registry.find_skill(intent, &entities);
        debug!("Intent {} handled by {}", intent, skill.name());

        let request = Request::new(text, intent, &entities);
        let response = match skill.handle(&request, &self.skills).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Skill {} failed: {}", skill.name(), e);
                format!("Sorry, I couldn't do that: {}", e)
            }
        };

        let timestamp = Utc::now();
        if self.enable_context {
            self.lock_context().push(ContextTurn {
                query: text.to_string(),
                response: response.clone(),
                intent,
                timestamp,
                extra,
            });
        }

        Reply {
            query: text.to_string(),
            intent,
            skill: skill.name().to_string(),
            response,
            emotion: nlu::analyze_emotion(text),
            timestamp,
            context_id: nlu::context_id(text),
            entities,
        }
    }

    /// Handle a command: reply, record it in the command history and speak
    /// the reply when voice output is on
    pub async fn process_command(&self, text: &str) -> Result<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RavenError::InvalidRequest("No command provided".to_string()));
        }
        info!("Command: {}", text);

        let reply = self.process_query(text, None).await;

        let record = create_record(text, &reply.response, Some(reply.intent.to_string()));
        if let Err(e) = self.history.append(&record) {
            warn!("Failed to record command history: {}", e);
        }

        if self.is_voice_active() {
            if let Some(speaker) = &self.speaker {
                if let Err(e) = speaker.speak(&reply.response, None, None) {
                    warn!("Failed to speak reply: {}", e);
                }
            }
        }

        Ok(reply.response)
    }

    pub fn is_voice_active(&self) -> bool {
        self.voice_active.load(Ordering::SeqCst)
    }

    /// Turn spoken replies on or off. Returns the new state, which stays
    /// off when there is no speaker.
    pub fn set_voice_active(&self, active: bool) -> bool {
        let active = active && self.speaker.is_some();
        self.voice_active.store(active, Ordering::SeqCst);
        active
    }

    /// Remembered exchanges, oldest first
    pub fn context(&self) -> Vec<ContextTurn> {
        self.lock_context().tail(0)
    }

    pub fn clear_context(&self) -> usize {
        self.lock_context().clear()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn speaker(&self) -> Option<&Arc<Speaker>> {
        self.speaker.as_ref()
    }

    pub fn probe(&self) -> Arc<dyn SystemProbe> {
        Arc::clone(&self.skills.probe)
    }

    pub fn skill_names(&self) -> Vec<&'static str> {
        self.registry.skill_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::testing::{FakeLauncher, FakeProbe};
    use crate::speech::tts::testing::RecordingEngine;
    use crate::speech::tts::{clean_text, VoiceSettings};

    fn config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.paths.data_dir = dir.to_string_lossy().into_owned();
        config
    }

    fn assistant(config: &AppConfig, speaker: Option<Arc<Speaker>>) -> Assistant {
        Assistant::new(
            config,
            Arc::new(FakeProbe::with_processes(&["bash"])),
            Arc::new(FakeLauncher::default()),
            speaker,
        )
    }

    #[tokio::test]
    async fn test_process_query_fills_reply() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = assistant(&config(dir.path()), None);

        let reply = assistant.process_query("Привет, Raven!", None).await;
        assert_eq!(reply.intent, Intent::Greeting);
        assert_eq!(reply.skill, "conversation");
        assert_eq!(reply.context_id.len(), 8);
        assert_eq!(reply.emotion, Emotion::Neutral);

        let again = assistant.process_query("Привет, Raven!", None).await;
        assert_eq!(reply.response, again.response);
        assert_eq!(reply.context_id, again.context_id);
    }

    #[tokio::test]
    async fn test_context_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.ai.max_context = 2;
        let assistant = assistant(&config, None);

        for text in ["привет", "который час", "пока"] {
            assistant.process_query(text, None).await;
        }
        let context = assistant.context();
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].query, "который час");
        assert_eq!(assistant.clear_context(), 2);
        assert!(assistant.context().is_empty());
    }

    #[tokio::test]
    async fn test_process_command_records_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.ai.command_history_limit = 3;
        let assistant = assistant(&config, None);

        for i in 0..5 {
            assistant.process_command(&format!("команда {}", i)).await.unwrap();
        }
        let recent = assistant.history().get_recent(10).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].command, "команда 4");
        assert_eq!(recent[0].intent.as_deref(), Some("unknown"));

        assert!(matches!(
            assistant.process_command("   ").await,
            Err(RavenError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_replies_are_spoken_when_voice_active() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let engine = Arc::new(RecordingEngine::default());
        let speaker = Arc::new(Speaker::new(engine.clone(), VoiceSettings::from(&config.tts)));
        let assistant = assistant(&config, Some(speaker.clone()));
        assert!(assistant.is_voice_active());

        let response = assistant.process_command("спасибо").await.unwrap();
        speaker.speak_and_wait("done", None).await.unwrap();
        assert_eq!(*engine.spoken.lock().unwrap(), vec![clean_text(&response), "done".to_string()]);

        assert!(!assistant.set_voice_active(false));
        assistant.process_command("спасибо").await.unwrap();
        speaker.speak_and_wait("done", None).await.unwrap();
        assert_eq!(engine.spoken.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_voice_cannot_be_enabled_without_speaker() {
        let dir = tempfile::tempdir().unwrap();
        let assistant = assistant(&config(dir.path()), None);
        assert!(!assistant.is_voice_active());
        assert!(!assistant.set_voice_active(true));
    }
}
