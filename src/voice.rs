// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Continuous listening: capture, wake-word gate, dispatch, pause

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assistant::Assistant;
use crate::config::VoiceConfig;
use crate::speech::stt::strip_wake_word;
use crate::speech::Listener;
use crate::RavenError;

/// Pause after a failed capture before trying again
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Decide what part of an utterance is a command.
///
/// With a wake word present the rest of the utterance is the command. Without
/// one, the whole utterance counts unless a wake word is required.
pub fn gate_utterance(text: &str, wake_words: &[String], require_wake_word: bool) -> Option<String> {
    let command = match strip_wake_word(text, wake_words) {
        Some(rest) => rest,
        None if require_wake_word => return None,
        None => text.trim().to_string(),
    };
    (!command.is_empty()).then_some(command)
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Background listening loop
pub struct VoiceLoop {
    assistant: Arc<Assistant>,
    listener: Arc<Listener>,
    wake_words: Vec<String>,
    require_wake_word: bool,
    pause: Duration,
    running: Mutex<Option<Running>>,
}

impl VoiceLoop {
    pub fn new(assistant: Arc<Assistant>, listener: Arc<Listener>, voice: &VoiceConfig) -> Self {
        Self {
            assistant,
            listener,
            wake_words: voice.wake_words.clone(),
            require_wake_word: voice.require_wake_word,
            pause: Duration::from_millis(voice.pause_ms),
            running: Mutex::new(None),
        }
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start listening. Returns false if the loop was already running.
    pub fn start(&self) -> bool {
        let mut running = self.lock_running();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(listen_loop(
            Arc::clone(&self.assistant),
            Arc::clone(&self.listener),
            self.wake_words.clone(),
            self.require_wake_word,
            self.pause,
            shutdown_rx,
        ));
        *running = Some(Running { shutdown, handle });
        info!("Voice listening started");
        true
    }

    /// Stop listening and wait for the loop to exit. Returns false if it
    /// was not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.lock_running().take() else {
            return false;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            warn!("Voice loop ended abnormally: {}", e);
        }
        info!("Voice listening stopped");
        true
    }

    pub fn is_listening(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn listen_loop(
    assistant: Arc<Assistant>,
    listener: Arc<Listener>,
    wake_words: Vec<String>,
    require_wake_word: bool,
    pause: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let result = tokio::select! {
            _ = shutdown.changed() => break,
            result = listener.listen() => result,
        };

        let delay = match result {
            Ok(Some(recognition)) => {
                match gate_utterance(&recognition.text, &wake_words, require_wake_word) {
                    Some(command) => match assistant.process_command(&command).await {
                        Ok(response) => info!("Voice reply: {}", response),
                        Err(e) => warn!("Voice command failed: {}", e),
                    },
                    None => debug!("Ignored utterance without wake word: {}", recognition.text),
                }
                pause
            }
            Ok(None) => pause,
            Err(RavenError::Busy(_)) => {
                debug!("Microphone busy, waiting");
                ERROR_BACKOFF
            }
            Err(e) => {
                warn!("Listening failed: {}", e);
                ERROR_BACKOFF
            }
        };

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!("Voice loop exited");
}
