// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Text-to-speech
//!
//! Engines are blocking and run on the blocking pool. The [`Speaker`] owns a
//! single playback worker fed through a channel, so utterances never overlap
//! and callers never wait unless they ask to.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::{TtsConfig, TtsEngineKind};
use crate::nlu::pick;
use crate::{RavenError, Result};

/// Emotions accepted by [`Speaker::set_emotion`]
pub const EMOTIONS: &[&str] = &["neutral", "happy", "sad", "excited", "calm", "surprised"];

const MIN_RATE: u32 = 50;
const MAX_RATE: u32 = 300;

static UNSPEAKABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s.,!?\-]").expect("valid unspeakable regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid spaces regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub voice: Option<String>,
    /// Words per minute
    pub rate: u32,
    /// 0.0 - 1.0
    pub volume: f32,
    pub emotion: String,
}

impl From<&TtsConfig> for VoiceSettings {
    fn from(cfg: &TtsConfig) -> Self {
        Self {
            voice: cfg.voice.clone(),
            rate: cfg.rate.clamp(MIN_RATE, MAX_RATE),
            volume: cfg.volume.clamp(0.0, 1.0),
            emotion: cfg.emotion.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: Option<String>,
}

/// A synthesizer; calls block until the utterance has been played
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()>;

    fn voices(&self) -> Result<Vec<VoiceInfo>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Synth {
    Espeak,
    Say,
    Sapi,
}

/// Platform command-line synthesizer; text is passed on stdin
pub struct CommandEngine {
    synth: Synth,
}

impl CommandEngine {
    pub fn espeak() -> Self {
        Self { synth: Synth::Espeak }
    }

    pub fn say() -> Self {
        Self { synth: Synth::Say }
    }

    pub fn sapi() -> Self {
        Self { synth: Synth::Sapi }
    }

    /// The synthesizer normally present on this OS
    pub fn platform_default() -> Self {
        if cfg!(target_os = "windows") {
            Self::sapi()
        } else if cfg!(target_os = "macos") {
            Self::say()
        } else {
            Self::espeak()
        }
    }

    /// Program and arguments for one utterance
    fn command_line(&self, settings: &VoiceSettings) -> (String, Vec<String>) {
        match self.synth {
            Synth::Espeak => {
                let mut args = vec![
                    "-s".to_string(),
                    settings.rate.to_string(),
                    "-a".to_string(),
                    ((settings.volume * 200.0).round() as u32).to_string(),
                ];
                if let Some(voice) = &settings.voice {
                    args.push("-v".to_string());
                    args.push(voice.clone());
                }
                args.push("--stdin".to_string());
                ("espeak-ng".to_string(), args)
            }
            Synth::Say => {
                let mut args = vec!["-r".to_string(), settings.rate.to_string()];
                if let Some(voice) = &settings.voice {
                    args.push("-v".to_string());
                    args.push(voice.clone());
                }
                args.push("-f".to_string());
                args.push("-".to_string());
                ("say".to_string(), args)
            }
            Synth::Sapi => {
                // SAPI rate is -10..10 around a default of roughly 170 wpm
                let rate = ((settings.rate as i32 - 170) / 13).clamp(-10, 10);
                let volume = (settings.volume * 100.0).round() as u32;
                let select = settings
                    .voice
                    .as_ref()
                    .map(|v| format!("$s.SelectVoice('{}'); ", v.replace('\'', "''")))
                    .unwrap_or_default();
                let script = format!(
                    "Add-Type -AssemblyName System.Speech; \
                     $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
                     $s.Rate = {}; $s.Volume = {}; {}\
                     $s.Speak([Console]::In.ReadToEnd())",
                    rate, volume, select
                );
                (
                    "powershell".to_string(),
                    vec!["-NoProfile".to_string(), "-Command".to_string(), script],
                )
            }
        }
    }

    fn list_command(&self) -> (&'static str, Vec<&'static str>) {
        match self.synth {
            Synth::Espeak => ("espeak-ng", vec!["--voices"]),
            Synth::Say => ("say", vec!["-v", "?"]),
            Synth::Sapi => (
                "powershell",
                vec![
                    "-NoProfile",
                    "-Command",
                    "Add-Type -AssemblyName System.Speech; \
                     (New-Object System.Speech.Synthesis.SpeechSynthesizer).GetInstalledVoices() | \
                     ForEach-Object { $_.VoiceInfo.Name + '|' + $_.VoiceInfo.Culture }",
                ],
            ),
        }
    }

    fn parse_voices(&self, listing: &str) -> Vec<VoiceInfo> {
        match self.synth {
            Synth::Espeak => parse_espeak_voices(listing),
            Synth::Say => parse_say_voices(listing),
            Synth::Sapi => parse_sapi_voices(listing),
        }
    }
}

impl SpeechEngine for CommandEngine {
    fn name(&self) -> &str {
        match self.synth {
            Synth::Espeak => "espeak-ng",
            Synth::Say => "say",
            Synth::Sapi => "sapi",
        }
    }

    fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()> {
        let (program, args) = self.command_line(settings);
        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RavenError::Speech(format!("cannot start {}: {}", program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(RavenError::Speech(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>> {
        let (program, args) = self.list_command();
        let output = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RavenError::Speech(format!("cannot start {}: {}", program, e)))?;
        if !output.status.success() {
            return Err(RavenError::Speech(format!("{} exited with {}", program, output.status)));
        }
        Ok(self.parse_voices(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_espeak_voices(listing: &str) -> Vec<VoiceInfo> {
    // Pty Language Age/Gender VoiceName File Other-Languages
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 4 {
                return None;
            }
            Some(VoiceInfo {
                id: cols[1].to_string(),
                name: cols[3].replace('_', " "),
                language: Some(cols[1].to_string()),
            })
        })
        .collect()
}

fn parse_say_voices(listing: &str) -> Vec<VoiceInfo> {
    // "Alex                en_US    # Most people recognize me by my voice."
    listing
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim();
            let (name, lang) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(VoiceInfo {
                id: name.to_string(),
                name: name.to_string(),
                language: Some(lang.to_string()),
            })
        })
        .collect()
}

fn parse_sapi_voices(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .filter_map(|line| {
            let (name, culture) = line.trim().split_once('|')?;
            Some(VoiceInfo {
                id: name.to_string(),
                name: name.to_string(),
                language: Some(culture.to_string()).filter(|c| !c.is_empty()),
            })
        })
        .collect()
}

/// Engine that only logs what it would have said
pub struct SilentEngine;

impl SpeechEngine for SilentEngine {
    fn name(&self) -> &str {
        "silent"
    }

    fn speak(&self, text: &str, _settings: &VoiceSettings) -> Result<()> {
        debug!("(silent) {}", text);
        Ok(())
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>> {
        Ok(vec![VoiceInfo {
            id: "silent".to_string(),
            name: "Silent".to_string(),
            language: None,
        }])
    }
}

/// Create the engine selected in the settings
pub fn create_engine(kind: TtsEngineKind) -> Arc<dyn SpeechEngine> {
    match kind {
        TtsEngineKind::Auto => Arc::new(CommandEngine::platform_default()),
        TtsEngineKind::Espeak => Arc::new(CommandEngine::espeak()),
        TtsEngineKind::Say => Arc::new(CommandEngine::say()),
        TtsEngineKind::Sapi => Arc::new(CommandEngine::sapi()),
        TtsEngineKind::Silent => Arc::new(SilentEngine),
    }
}

/// Drop characters synthesizers read out literally and collapse whitespace
pub fn clean_text(text: &str) -> String {
    let text = UNSPEAKABLE_RE.replace_all(text, " ");
    SPACES_RE.replace_all(&text, " ").trim().to_string()
}

/// Prefix the text with a phrase matching the emotion
pub fn apply_emotion(text: &str, emotion: &str) -> String {
    let prefixes: &[&str] = match emotion {
        "happy" => &["Great! ", "Wonderful! ", "Happy to report: "],
        "sad" => &["Unfortunately, ", "Sorry, but ", "Sad news: "],
        "excited" => &["Attention! ", "Amazing! ", "Fantastic! "],
        "calm" => &["Okay. ", "As you wish. ", "Noted. "],
        "surprised" => &["Wow! ", "Unexpected! ", "Surprisingly: "],
        _ => return text.to_string(),
    };
    format!("{}{}", pick(text, prefixes), text)
}

struct Job {
    text: String,
    settings: VoiceSettings,
    epoch: u64,
    done: Option<oneshot::Sender<Result<()>>>,
}

#[derive(Default)]
struct QueueState {
    /// Bumped by `stop`; jobs from older epochs are discarded
    epoch: AtomicU64,
    queued: AtomicUsize,
    speaking: AtomicBool,
}

/// Queued speech output
pub struct Speaker {
    engine: Arc<dyn SpeechEngine>,
    settings: Mutex<VoiceSettings>,
    tx: mpsc::UnboundedSender<Job>,
    state: Arc<QueueState>,
}

impl Speaker {
    /// Start a speaker and its playback worker. Must be called inside a
    /// tokio runtime.
    pub fn new(engine: Arc<dyn SpeechEngine>, settings: VoiceSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        tokio::spawn(playback_worker(Arc::clone(&engine), rx, Arc::clone(&state)));

        Self {
            engine,
            settings: Mutex::new(settings),
            tx,
            state,
        }
    }

    pub fn from_config(cfg: &TtsConfig) -> Self {
        Self::new(create_engine(cfg.engine), VoiceSettings::from(cfg))
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    fn lock_settings(&self) -> MutexGuard<'_, VoiceSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn settings(&self) -> VoiceSettings {
        self.lock_settings().clone()
    }

    /// Queue text for playback. Returns false when there is nothing to say.
    pub fn speak(&self, text: &str, voice: Option<&str>, emotion: Option<&str>) -> Result<bool> {
        let Some(job) = self.prepare(text, voice, emotion) else {
            return Ok(false);
        };
        self.enqueue(job, None)?;
        Ok(true)
    }

    /// Queue text and wait until it has been played
    pub async fn speak_and_wait(&self, text: &str, emotion: Option<&str>) -> Result<()> {
        let Some(job) = self.prepare(text, None, emotion) else {
            return Ok(());
        };
        let (done_tx, done_rx) = oneshot::channel();
        self.enqueue(job, Some(done_tx))?;
        done_rx
            .await
            .map_err(|_| RavenError::Speech("speech request was dropped".to_string()))?
    }

    fn prepare(&self, text: &str, voice: Option<&str>, emotion: Option<&str>) -> Option<Job> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return None;
        }

        let mut settings = self.settings();
        if let Some(voice) = voice {
            settings.voice = Some(voice.to_string());
        }
        let emotion = emotion.unwrap_or(settings.emotion.as_str()).to_string();

        Some(Job {
            text: apply_emotion(&cleaned, &emotion),
            settings,
            epoch: self.state.epoch.load(Ordering::SeqCst),
            done: None,
        })
    }

    fn enqueue(&self, mut job: Job, done: Option<oneshot::Sender<Result<()>>>) -> Result<()> {
        job.done = done;
        self.state.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.state.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(RavenError::Speech("speech worker has stopped".to_string()));
        }
        Ok(())
    }

    /// Drop everything still queued. The current utterance plays to the end.
    pub fn stop(&self) {
        self.state.epoch.fetch_add(1, Ordering::SeqCst);
        debug!("Speech queue cleared");
    }

    pub fn set_voice(&self, voice: Option<String>) {
        self.lock_settings().voice = voice;
    }

    pub fn set_emotion(&self, emotion: &str) -> Result<()> {
        if !EMOTIONS.contains(&emotion) {
            return Err(RavenError::InvalidRequest(format!(
                "unknown emotion '{}', expected one of {}",
                emotion,
                EMOTIONS.join(", ")
            )));
        }
        self.lock_settings().emotion = emotion.to_string();
        Ok(())
    }

    /// Set the speech rate, clamped to 50-300 wpm. Returns the applied value.
    pub fn set_rate(&self, rate: u32) -> u32 {
        let rate = rate.clamp(MIN_RATE, MAX_RATE);
        self.lock_settings().rate = rate;
        rate
    }

    /// Set the volume, clamped to 0-1. Returns the applied value.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.lock_settings().volume = volume;
        volume
    }

    pub async fn voices(&self) -> Result<Vec<VoiceInfo>> {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.voices()).await?
    }

    pub fn queue_len(&self) -> usize {
        self.state.queued.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.state.speaking.load(Ordering::SeqCst)
    }
}

async fn playback_worker(
    engine: Arc<dyn SpeechEngine>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    state: Arc<QueueState>,
) {
    while let Some(job) = rx.recv().await {
        state.queued.fetch_sub(1, Ordering::SeqCst);
        let Job { text, settings, epoch, done } = job;

        if epoch != state.epoch.load(Ordering::SeqCst) {
            if let Some(done) = done {
                let _ = done.send(Err(RavenError::Speech("speech was cancelled".to_string())));
            }
            continue;
        }

        state.speaking.store(true, Ordering::SeqCst);
        let engine = Arc::clone(&engine);
        let result = match tokio::task::spawn_blocking(move || engine.speak(&text, &settings)).await {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };
        state.speaking.store(false, Ordering::SeqCst);

        if let Err(e) = &result {
            warn!("Speech playback failed: {}", e);
        }
        if let Some(done) = done {
            let _ = done.send(result);
        }
    }
    debug!("Speech worker stopped");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::time::Duration;

    /// Records what it was asked to say
    #[derive(Default)]
    pub struct RecordingEngine {
        pub spoken: Mutex<Vec<String>>,
        pub delay: Option<Duration>,
    }

    impl SpeechEngine for RecordingEngine {
        fn name(&self) -> &str {
            "recording"
        }

        fn speak(&self, text: &str, _settings: &VoiceSettings) -> Result<()> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn voices(&self) -> Result<Vec<VoiceInfo>> {
            Ok(vec![VoiceInfo {
                id: "test".to_string(),
                name: "Test Voice".to_string(),
                language: Some("en".to_string()),
            }])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingEngine;
    use super::*;
    use std::time::Duration;

    fn settings() -> VoiceSettings {
        VoiceSettings::from(&TtsConfig::default())
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Hello,   *world*  😀 "), "Hello, world");
        assert_eq!(clean_text("Done. Ready?"), "Done. Ready?");
        assert_eq!(clean_text("Привет — мир"), "Привет мир");
        assert_eq!(clean_text("###"), "");
    }

    #[test]
    fn test_apply_emotion() {
        assert_eq!(apply_emotion("done", "neutral"), "done");
        assert_eq!(apply_emotion("done", "bogus"), "done");
        let happy = apply_emotion("done", "happy");
        assert!(happy.ends_with("done"));
        assert_ne!(happy, "done");
        assert_eq!(happy, apply_emotion("done", "happy"));
    }

    #[test]
    fn test_espeak_command_line() {
        let mut s = settings();
        s.voice = Some("ru".to_string());
        let (program, args) = CommandEngine::espeak().command_line(&s);
        assert_eq!(program, "espeak-ng");
        assert_eq!(args, vec!["-s", "170", "-a", "180", "-v", "ru", "--stdin"]);
    }

    #[test]
    fn test_parse_voice_listings() {
        let espeak = " Pty Language       Age/Gender VoiceName          File          Other Languages\n \
                      5  ru              --/M      Russian            zle/ru\n";
        let voices = parse_espeak_voices(espeak);
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].id, "ru");

        let say = "Alex                en_US    # Most people recognize me by my voice.\n\
                   Bad News            en_US    # The light you see at the end of the tunnel\n";
        let voices = parse_say_voices(say);
        assert_eq!(voices[1].name, "Bad News");
        assert_eq!(voices[1].language.as_deref(), Some("en_US"));

        let voices = parse_sapi_voices("Microsoft Irina Desktop|ru-RU\r\n");
        assert_eq!(voices[0].name, "Microsoft Irina Desktop");
    }

    #[tokio::test]
    async fn test_speak_and_wait_plays_in_order() {
        let engine = Arc::new(RecordingEngine::default());
        let speaker = Speaker::new(engine.clone(), settings());

        assert!(speaker.speak("first", None, None).unwrap());
        assert!(!speaker.speak("   ", None, None).unwrap());
        speaker.speak_and_wait("second", None).await.unwrap();

        assert_eq!(*engine.spoken.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(speaker.queue_len(), 0);
        assert!(!speaker.is_speaking());
    }

    #[tokio::test]
    async fn test_stop_drops_queued() {
        let engine = Arc::new(RecordingEngine {
            delay: Some(Duration::from_millis(50)),
            ..RecordingEngine::default()
        });
        let speaker = Speaker::new(engine.clone(), settings());

        speaker.speak("one", None, None).unwrap();
        speaker.speak("two", None, None).unwrap();
        speaker.speak("three", None, None).unwrap();
        speaker.stop();
        speaker.speak_and_wait("four", None).await.unwrap();

        let spoken = engine.spoken.lock().unwrap();
        assert!(!spoken.contains(&"two".to_string()));
        assert!(!spoken.contains(&"three".to_string()));
        assert_eq!(spoken.last().map(String::as_str), Some("four"));
    }

    #[tokio::test]
    async fn test_settings_are_clamped_and_validated() {
        let speaker = Speaker::new(Arc::new(RecordingEngine::default()), settings());
        assert_eq!(speaker.set_rate(1000), 300);
        assert_eq!(speaker.set_rate(10), 50);
        assert_eq!(speaker.set_volume(1.5), 1.0);
        assert_eq!(speaker.set_volume(-1.0), 0.0);
        assert!(speaker.set_emotion("happy").is_ok());
        assert!(matches!(speaker.set_emotion("angry"), Err(RavenError::InvalidRequest(_))));
        assert_eq!(speaker.settings().emotion, "happy");

        let voices = speaker.voices().await.unwrap();
        assert_eq!(voices[0].id, "test");
    }
}
