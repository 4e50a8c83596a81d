// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Speech recognition
//!
//! Audio is captured to a WAV file by an external recorder, then handed to a
//! chain of transcription engines tried in order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{energy_threshold, AppConfig, RecorderConfig, SttConfig, SttEngineConfig, VoiceConfig};
use crate::{RavenError, Result};

/// Grace period on top of the phrase limit before a capture is abandoned
const CAPTURE_GRACE_SECS: u64 = 2;

/// A recognized utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub engine: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub name: String,
    pub available: bool,
}

/// Trait for speech-to-text backends
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Name used in settings and logs
    fn name(&self) -> &str;

    /// Whether the backend can be tried at all
    fn is_available(&self) -> bool;

    /// Transcribe a WAV file; an empty string means no speech was found
    async fn transcribe(&self, wav_path: &Path, language: &str) -> Result<String>;
}

/// OpenAI-compatible `/v1/audio/transcriptions` endpoint
pub struct HttpTranscriber {
    name: String,
    client: Client,
    url: String,
    model: Option<String>,
    api_key: Option<String>,
}

impl HttpTranscriber {
    pub fn new(name: &str, url: &str, model: Option<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        let url = url.trim_end_matches('/').to_string();
        info!("HTTP transcriber {}: endpoint {}", name, url);

        Ok(Self {
            name: name.to_string(),
            client,
            url,
            model,
            api_key,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn transcribe(&self, wav_path: &Path, language: &str) -> Result<String> {
        let wav_bytes = tokio::fs::read(wav_path).await?;
        let file_name = wav_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        let part = Part::bytes(wav_bytes).file_name(file_name).mime_str("audio/wav")?;
        let mut form = Form::new()
            .part("file", part)
            .text("language", language.to_string())
            .text("response_format", "json");
        if let Some(model) = &self.model {
            form = form.text("model", model.clone());
        }

        let mut request = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RavenError::Recognition(format!(
                "{} returned {}: {}",
                self.name, status, body
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let text = body["text"].as_str().unwrap_or("").trim().to_string();
        debug!("{} transcription: {:?}", self.name, text);
        Ok(text)
    }
}

/// External program printing the transcript on stdout
pub struct CommandTranscriber {
    name: String,
    program: String,
    args: Vec<String>,
    model_path: Option<PathBuf>,
}

impl CommandTranscriber {
    pub fn new(name: &str, program: &str, args: Vec<String>, model_path: Option<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args,
            model_path,
        }
    }

    fn command_args(&self, wav_path: &Path, language: &str) -> Vec<String> {
        let model = self
            .model_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let wav = wav_path.to_string_lossy();
        substitute(
            &self.args,
            &[("{wav}", &*wav), ("{lang}", language), ("{model}", model.as_str())],
        )
    }
}

#[async_trait]
impl Transcriber for CommandTranscriber {
    fn name(&self) -> &str {
        &self.name
    }

    /// Only when the model it needs is on disk
    fn is_available(&self) -> bool {
        self.model_path.as_ref().map_or(true, |p| p.exists())
    }

    async fn transcribe(&self, wav_path: &Path, language: &str) -> Result<String> {
        let args = self.command_args(wav_path, language);
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RavenError::Recognition(format!("cannot start {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(RavenError::Recognition(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        debug!("{} transcription: {:?}", self.name, text);
        Ok(text)
    }
}

/// Replace `{placeholders}` in each argument
pub fn substitute(args: &[String], values: &[(&str, &str)]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            values
                .iter()
                .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
        })
        .collect()
}

/// Create a transcriber from its settings entry
pub fn create_transcriber(cfg: &SttEngineConfig) -> Result<Arc<dyn Transcriber>> {
    let transcriber: Arc<dyn Transcriber> = match cfg {
        SttEngineConfig::Http { name, url, model, api_key } => {
            Arc::new(HttpTranscriber::new(name, url, model.clone(), api_key.clone())?)
        }
        SttEngineConfig::Command { name, program, args, model_path } => Arc::new(
            CommandTranscriber::new(name, program, args.clone(), model_path.as_ref().map(PathBuf::from)),
        ),
    };
    Ok(transcriber)
}

/// Engines tried in order until one hears something
pub struct RecognizerChain {
    engines: RwLock<Vec<Arc<dyn Transcriber>>>,
    last_result: Mutex<Option<Recognition>>,
}

impl RecognizerChain {
    pub fn new(engines: Vec<Arc<dyn Transcriber>>) -> Self {
        Self {
            engines: RwLock::new(engines),
            last_result: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &SttConfig) -> Result<Self> {
        let engines = cfg
            .engines
            .iter()
            .map(create_transcriber)
            .collect::<Result<Vec<_>>>()?;
        let chain = Self::new(engines);
        if let Some(preferred) = &cfg.preferred {
            chain.set_preferred_engine(preferred)?;
        }
        Ok(chain)
    }

    fn snapshot(&self) -> Vec<Arc<dyn Transcriber>> {
        self.engines
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// First non-empty transcription wins. Failing engines are logged and skipped.
    pub async fn recognize(&self, wav_path: &Path, language: &str) -> Result<Option<Recognition>> {
        for engine in self.snapshot() {
            if !engine.is_available() {
                debug!("Skipping unavailable engine {}", engine.name());
                continue;
            }

            match engine.transcribe(wav_path, language).await {
                Ok(text) if !text.is_empty() => {
                    info!("Recognized via {}: {}", engine.name(), text);
                    let recognition = Recognition {
                        text,
                        engine: engine.name().to_string(),
                        timestamp: Utc::now(),
                    };
                    *self.last_result.lock().unwrap_or_else(|e| e.into_inner()) =
                        Some(recognition.clone());
                    return Ok(Some(recognition));
                }
                Ok(_) => debug!("{} heard nothing", engine.name()),
                Err(e) => warn!("Engine {} failed: {}", engine.name(), e),
            }
        }
        Ok(None)
    }

    pub fn last_result(&self) -> Option<Recognition> {
        self.last_result.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Move an engine to the front of the chain
    pub fn set_preferred_engine(&self, name: &str) -> Result<()> {
        let mut engines = self.engines.write().unwrap_or_else(|e| e.into_inner());
        let idx = engines
            .iter()
            .position(|e| e.name() == name)
            .ok_or_else(|| RavenError::NotFound(format!("speech engine '{}'", name)))?;
        let engine = engines.remove(idx);
        engines.insert(0, engine);
        info!("Preferred speech engine: {}", name);
        Ok(())
    }

    pub fn available_engines(&self) -> Vec<EngineStatus> {
        self.snapshot()
            .iter()
            .map(|e| EngineStatus {
                name: e.name().to_string(),
                available: e.is_available(),
            })
            .collect()
    }
}

/// Captures audio into a WAV file
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Record for at most `secs` seconds. Returns false when the capture
    /// timed out without producing audio.
    async fn record(&self, wav_path: &Path, secs: u64) -> Result<bool>;
}

/// External recorder such as `arecord` or `sox`
pub struct CommandRecorder {
    program: String,
    args: Vec<String>,
    /// Extra time allowed for the recorder to start
    startup: Duration,
}

impl CommandRecorder {
    pub fn new(cfg: &RecorderConfig, startup_secs: u64) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            startup: Duration::from_secs(startup_secs),
        }
    }
}

#[async_trait]
impl Recorder for CommandRecorder {
    async fn record(&self, wav_path: &Path, secs: u64) -> Result<bool> {
        let wav = wav_path.to_string_lossy();
        let secs_arg = secs.to_string();
        let args = substitute(&self.args, &[("{wav}", &*wav), ("{secs}", secs_arg.as_str())]);
        debug!("Recording: {} {:?}", self.program, args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RavenError::Recognition(format!("cannot start {}: {}", self.program, e)))?;

        let limit = self.startup + Duration::from_secs(secs + CAPTURE_GRACE_SECS);
        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("Recording timed out after {:?}", limit);
                return Ok(false);
            }
        };

        if !output.status.success() {
            return Err(RavenError::Recognition(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let size = tokio::fs::metadata(wav_path).await.map(|m| m.len()).unwrap_or(0);
        Ok(size > 0)
    }
}

/// RMS level of a 16-bit PCM WAV file, `None` when `bytes` is not one
pub fn wav_rms(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut bits = None;
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().ok()?) as usize;
        let start = pos + 8;
        let body = &bytes[start..start.saturating_add(size).min(bytes.len())];

        match id {
            b"fmt " if body.len() >= 16 => bits = Some(u16::from_le_bytes([body[14], body[15]])),
            b"data" => {
                if bits != Some(16) {
                    return None;
                }
                let (sum, count) = body
                    .chunks_exact(2)
                    .map(|c| f64::from(i16::from_le_bytes([c[0], c[1]])))
                    .fold((0.0, 0usize), |(sum, n), x| (sum + x * x, n + 1));
                return (count > 0).then(|| (sum / count as f64).sqrt());
            }
            _ => {}
        }
        // chunks are padded to an even length
        pos = start.saturating_add(size).saturating_add(size & 1);
    }
    None
}

/// Recorder and recognizer chain with at most one capture in flight
pub struct Listener {
    recorder: Arc<dyn Recorder>,
    chain: RecognizerChain,
    capture: tokio::sync::Mutex<()>,
    language: String,
    phrase_secs: u64,
    /// Captures quieter than this RMS level are dropped as silence
    energy_threshold: AtomicU32,
}

impl Listener {
    pub fn new(recorder: Arc<dyn Recorder>, chain: RecognizerChain, voice: &VoiceConfig) -> Self {
        Self {
            recorder,
            chain,
            capture: tokio::sync::Mutex::new(()),
            language: voice.language_code().to_string(),
            phrase_secs: voice.phrase_time_limit_secs,
            energy_threshold: AtomicU32::new(voice.energy_threshold()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let recorder = Arc::new(CommandRecorder::new(&config.stt.recorder, config.voice.timeout_secs));
        let chain = RecognizerChain::from_config(&config.stt)?;
        Ok(Self::new(recorder, chain, &config.voice))
    }

    /// Capture one phrase and transcribe it. Fails with `Busy` while another
    /// capture is running.
    pub async fn listen(&self) -> Result<Option<Recognition>> {
        let _guard = self
            .capture
            .try_lock()
            .map_err(|_| RavenError::Busy("a voice capture is already running".to_string()))?;

        let wav = tempfile::Builder::new()
            .prefix("raven-")
            .suffix(".wav")
            .tempfile()?;

        if !self.recorder.record(wav.path(), self.phrase_secs).await? {
            return Ok(None);
        }
        if self.is_silent(wav.path()).await {
            return Ok(None);
        }
        self.chain.recognize(wav.path(), &self.language).await
    }

    /// Files that can't be measured are passed on to the recognizers
    async fn is_silent(&self, wav_path: &Path) -> bool {
        let Some(rms) = tokio::fs::read(wav_path).await.ok().and_then(|b| wav_rms(&b)) else {
            return false;
        };
        let threshold = self.energy_threshold.load(Ordering::Relaxed);
        if rms < f64::from(threshold) {
            debug!("Capture below energy threshold ({:.0} < {})", rms, threshold);
            return true;
        }
        false
    }

    /// Apply a microphone sensitivity from 1 to 10
    pub fn set_sensitivity(&self, sensitivity: u8) {
        self.energy_threshold
            .store(energy_threshold(sensitivity), Ordering::Relaxed);
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.try_lock().is_err()
    }

    pub fn chain(&self) -> &RecognizerChain {
        &self.chain
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

/// If the utterance contains a wake word, return it with the wake words removed
pub fn strip_wake_word(text: &str, wake_words: &[String]) -> Option<String> {
    let normalized = crate::nlu::normalize(text);
    let found = wake_words.iter().any(|w| {
        let w = w.to_lowercase();
        if w.contains(' ') {
            normalized.text.contains(&w)
        } else {
            normalized.words.iter().any(|word| *word == w)
        }
    });
    if !found {
        return None;
    }

    let lowered: Vec<String> = wake_words.iter().map(|w| w.to_lowercase()).collect();
    let keywords: Vec<&str> = lowered.iter().map(String::as_str).collect();
    Some(crate::nlu::strip_keywords(text, &keywords))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTranscriber {
        name: &'static str,
        available: bool,
        reply: std::result::Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl FakeTranscriber {
        fn new(
            name: &'static str,
            available: bool,
            reply: std::result::Result<&'static str, &'static str>,
        ) -> Arc<Self> {
            Arc::new(Self { name, available, reply, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn transcribe(&self, _wav_path: &Path, _language: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(message) => Err(RavenError::Recognition(message.to_string())),
            }
        }
    }

    struct FakeRecorder {
        delay: Duration,
        audio: Vec<u8>,
    }

    #[async_trait]
    impl Recorder for FakeRecorder {
        async fn record(&self, wav_path: &Path, _secs: u64) -> Result<bool> {
            tokio::time::sleep(self.delay).await;
            tokio::fs::write(wav_path, &self.audio).await?;
            Ok(true)
        }
    }

    /// Mono 16 kHz 16-bit WAV with a square wave of the given amplitude
    fn square_wave(amplitude: i16, samples: usize) -> Vec<u8> {
        let data_len = (samples * 2) as u32;
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes());
        wav.extend_from_slice(&16_000u32.to_le_bytes());
        wav.extend_from_slice(&32_000u32.to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..samples {
            let sample = if i % 2 == 0 { amplitude } else { -amplitude };
            wav.extend_from_slice(&sample.to_le_bytes());
        }
        wav
    }

    fn listener_with_audio(audio: Vec<u8>, transcriber: Arc<FakeTranscriber>) -> Listener {
        Listener::new(
            Arc::new(FakeRecorder { delay: Duration::ZERO, audio }),
            RecognizerChain::new(vec![transcriber]),
            &VoiceConfig::default(),
        )
    }

    #[test]
    fn test_wav_rms() {
        let rms = wav_rms(&square_wave(1000, 160)).unwrap();
        assert!((rms - 1000.0).abs() < 0.01);
        assert!(wav_rms(b"RIFF").is_none());
        assert!(wav_rms(b"not a wav file at all").is_none());
        assert!(wav_rms(&square_wave(1000, 0)).is_none());
    }

    #[tokio::test]
    async fn test_quiet_capture_is_dropped() {
        let transcriber = FakeTranscriber::new("good", true, Ok("привет"));
        let listener = listener_with_audio(square_wave(50, 1600), transcriber.clone());

        assert!(listener.listen().await.unwrap().is_none());
        assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);

        let loud = listener_with_audio(square_wave(5000, 1600), transcriber.clone());
        assert_eq!(loud.listen().await.unwrap().unwrap().text, "привет");
    }

    #[tokio::test]
    async fn test_sensitivity_lowers_threshold() {
        let transcriber = FakeTranscriber::new("good", true, Ok("привет"));
        let listener = listener_with_audio(square_wave(150, 1600), transcriber.clone());
        assert!(listener.listen().await.unwrap().is_none());

        listener.set_sensitivity(10);
        assert_eq!(listener.listen().await.unwrap().unwrap().text, "привет");
    }

    #[tokio::test]
    async fn test_chain_falls_back() {
        let offline = FakeTranscriber::new("offline", false, Ok("never"));
        let broken = FakeTranscriber::new("broken", true, Err("boom"));
        let silent = FakeTranscriber::new("silent", true, Ok(""));
        let good = FakeTranscriber::new("good", true, Ok("открой браузер"));
        let chain = RecognizerChain::new(vec![
            offline.clone(),
            broken.clone(),
            silent.clone(),
            good.clone(),
        ]);

        let result = chain.recognize(Path::new("unused.wav"), "ru").await.unwrap().unwrap();
        assert_eq!(result.text, "открой браузер");
        assert_eq!(result.engine, "good");
        assert_eq!(offline.calls.load(Ordering::SeqCst), 0);
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(chain.last_result().map(|r| r.engine), Some("good".to_string()));
    }

    #[tokio::test]
    async fn test_chain_without_result() {
        let chain = RecognizerChain::new(vec![FakeTranscriber::new("silent", true, Ok(""))]);
        assert!(chain.recognize(Path::new("x.wav"), "en").await.unwrap().is_none());
        assert!(chain.last_result().is_none());
    }

    #[test]
    fn test_set_preferred_engine() {
        let chain = RecognizerChain::new(vec![
            FakeTranscriber::new("a", true, Ok("")),
            FakeTranscriber::new("b", false, Ok("")),
        ]);
        chain.set_preferred_engine("b").unwrap();
        let names: Vec<String> = chain.available_engines().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(matches!(chain.set_preferred_engine("zzz"), Err(RavenError::NotFound(_))));
    }

    #[test]
    fn test_command_transcriber_args_and_availability() {
        let t = CommandTranscriber::new(
            "vosk",
            "vosk-transcriber",
            vec!["-m".into(), "{model}".into(), "-l".into(), "{lang}".into(), "-i".into(), "{wav}".into()],
            Some(PathBuf::from("/nonexistent/model")),
        );
        assert!(!t.is_available());
        assert_eq!(
            t.command_args(Path::new("/tmp/a.wav"), "ru"),
            vec!["-m", "/nonexistent/model", "-l", "ru", "-i", "/tmp/a.wav"]
        );

        let dir = tempfile::tempdir().unwrap();
        let t = CommandTranscriber::new("w", "whisper-cli", Vec::new(), Some(dir.path().to_path_buf()));
        assert!(t.is_available());
    }

    #[tokio::test]
    async fn test_second_capture_is_busy() {
        let chain = RecognizerChain::new(vec![FakeTranscriber::new("good", true, Ok("привет"))]);
        let listener = Listener::new(
            Arc::new(FakeRecorder { delay: Duration::from_millis(50), audio: b"RIFF".to_vec() }),
            chain,
            &VoiceConfig::default(),
        );

        let (first, second) = tokio::join!(listener.listen(), listener.listen());
        assert_eq!(first.unwrap().unwrap().text, "привет");
        assert!(matches!(second, Err(RavenError::Busy(_))));
        assert!(!listener.is_capturing());
        assert_eq!(listener.language(), "ru");
    }

    #[test]
    fn test_strip_wake_word() {
        let words = vec!["raven".to_string(), "рейвен".to_string()];
        assert_eq!(strip_wake_word("Raven, открой браузер", &words).as_deref(), Some("открой браузер"));
        assert_eq!(strip_wake_word("рейвен", &words).as_deref(), Some(""));
        assert_eq!(strip_wake_word("открой браузер", &words), None);
        assert_eq!(strip_wake_word("ravenous appetite", &words), None);
    }
}
