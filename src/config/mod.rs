// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Raven
//!
//! Settings live in a single JSON document (`config/settings.json` by
//! default). Every section and field carries a serde default, so a partial
//! file is completed from the defaults on load.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::{RavenError, Result};

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Dashboard look and feel
    #[serde(default)]
    pub appearance: AppearanceConfig,

    /// Voice capture and wake words
    #[serde(default)]
    pub voice: VoiceConfig,

    /// Command processing and history limits
    #[serde(default)]
    pub ai: AiConfig,

    /// Logging
    #[serde(default)]
    pub system: SystemConfig,

    /// Speech synthesis
    #[serde(default)]
    pub tts: TtsConfig,

    /// Speech recognition engines and recorder
    #[serde(default)]
    pub stt: SttConfig,

    /// Applications the assistant can open and close
    #[serde(default = "default_apps")]
    pub apps: Vec<AppEntry>,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Data and log directories
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Dashboard look
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppearanceConfig {
    /// `light`, `dark` or `auto` (follows the browser)
    #[serde(default = "default_theme")]
    pub theme: String,
    /// `#rgb` or `#rrggbb`
    #[serde(default = "default_accent")]
    pub accent_color: String,
    /// Base font size in px
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_true")]
    pub animation_enabled: bool,
}

pub const THEMES: &[&str] = &["light", "dark", "auto"];

/// Whether `value` is a `#rgb` or `#rrggbb` colour
pub fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VoiceConfig {
    /// Speak replies and accept voice commands
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_wake_words")]
    pub wake_words: Vec<String>,
    /// Ignore utterances that don't start with a wake word
    #[serde(default)]
    pub require_wake_word: bool,
    #[serde(default = "default_language")]
    pub language: String,
    /// Seconds to wait for speech to start
    #[serde(default = "default_listen_timeout")]
    pub timeout_secs: u64,
    /// Maximum length of a single phrase in seconds
    #[serde(default = "default_phrase_limit")]
    pub phrase_time_limit_secs: u64,
    /// Microphone sensitivity, 1 (least) to 10 (most)
    #[serde(default = "default_sensitivity")]
    pub sensitivity: u8,
    /// Pause between listening rounds
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AiConfig {
    /// Model id reported by the chat endpoint
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_true")]
    pub enable_context: bool,
    /// Number of query/response pairs kept as context
    #[serde(default = "default_max_context")]
    pub max_context: usize,
    #[serde(default = "default_command_history_limit")]
    pub command_history_limit: usize,
    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,
    /// Search URL; the query is appended as the `q` parameter
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// Page opened for "open the browser"
    #[serde(default = "default_home_url")]
    pub home_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    #[serde(default = "default_true")]
    pub save_logs: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngineKind {
    /// Pick the platform's command-line synthesizer
    Auto,
    Espeak,
    Say,
    Sapi,
    Silent,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TtsConfig {
    #[serde(default = "default_tts_engine")]
    pub engine: TtsEngineKind,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "default_rate")]
    pub rate: u32,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_emotion")]
    pub emotion: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SttConfig {
    /// Engines in fallback order
    #[serde(default = "default_stt_engines")]
    pub engines: Vec<SttEngineConfig>,
    /// Engine tried first, if set
    #[serde(default)]
    pub preferred: Option<String>,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

/// A speech recognition backend
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SttEngineConfig {
    /// OpenAI-compatible `/v1/audio/transcriptions` endpoint
    Http {
        name: String,
        url: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        api_key: Option<String>,
    },
    /// External program printing the transcript on stdout.
    /// `{wav}`, `{lang}` and `{model}` in args are substituted.
    Command {
        name: String,
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        model_path: Option<String>,
    },
}

impl SttEngineConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Http { name, .. } | Self::Command { name, .. } => name,
        }
    }
}

/// External recorder; `{wav}` and `{secs}` in args are substituted
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecorderConfig {
    pub program: String,
    pub args: Vec<String>,
}

/// An application the assistant knows by name
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppEntry {
    pub name: String,
    /// Spoken names, lower-case
    pub aliases: Vec<String>,
    /// Program and arguments; empty when `url` is used instead
    #[serde(default)]
    pub command: Vec<String>,
    /// Opened instead of running a command. With neither set, the app
    /// opens `ai.home_url`.
    #[serde(default)]
    pub url: Option<String>,
    /// Process name fragments matched when closing the app
    #[serde(default)]
    pub process_names: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PathsConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_theme() -> String { "light".to_string() }
fn default_accent() -> String { "#3498db".to_string() }
fn default_font_size() -> u32 { 13 }
fn default_wake_words() -> Vec<String> {
    vec!["raven", "рейвен", "рэйвэн"].into_iter().map(String::from).collect()
}
fn default_language() -> String { "ru-RU".to_string() }
fn default_listen_timeout() -> u64 { 5 }
fn default_phrase_limit() -> u64 { 10 }
fn default_sensitivity() -> u8 { 7 }
fn default_pause_ms() -> u64 { 500 }
fn default_model() -> String { "raven_core".to_string() }
fn default_max_context() -> usize { 10 }
fn default_command_history_limit() -> usize { 50 }
fn default_chat_history_limit() -> usize { 100 }
fn default_search_url() -> String { "https://www.google.com/search".to_string() }
fn default_home_url() -> String { "https://www.google.com".to_string() }
fn default_log_level() -> String { "INFO".to_string() }
fn default_tts_engine() -> TtsEngineKind { TtsEngineKind::Auto }
fn default_rate() -> u32 { 170 }
fn default_volume() -> f32 { 0.9 }
fn default_emotion() -> String { "neutral".to_string() }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 5000 }
fn default_db_path() -> String { "data/raven.db".to_string() }
fn default_data_dir() -> String { "data".to_string() }
fn default_log_dir() -> String { "logs".to_string() }

fn default_stt_engines() -> Vec<SttEngineConfig> {
    vec![
        SttEngineConfig::Http {
            name: "whisper-server".to_string(),
            url: "http://127.0.0.1:8178".to_string(),
            model: None,
            api_key: None,
        },
        SttEngineConfig::Command {
            name: "vosk".to_string(),
            program: "vosk-transcriber".to_string(),
            args: vec!["-m", "{model}", "-l", "{lang}", "-i", "{wav}"]
                .into_iter().map(String::from).collect(),
            model_path: Some("models/vosk-model-small-ru-0.22".to_string()),
        },
        SttEngineConfig::Command {
            name: "whisper-cli".to_string(),
            program: "whisper-cli".to_string(),
            args: vec!["-nt", "-np", "-l", "{lang}", "-m", "{model}", "-f", "{wav}"]
                .into_iter().map(String::from).collect(),
            model_path: Some("models/ggml-base.bin".to_string()),
        },
    ]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(target_os = "windows")]
fn platform_commands() -> (Vec<String>, Vec<String>, Vec<String>) {
    (strings(&["notepad.exe"]), strings(&["calc.exe"]), strings(&["explorer.exe"]))
}

#[cfg(target_os = "macos")]
fn platform_commands() -> (Vec<String>, Vec<String>, Vec<String>) {
    (
        strings(&["open", "-a", "TextEdit"]),
        strings(&["open", "-a", "Calculator"]),
        strings(&["open", "."]),
    )
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_commands() -> (Vec<String>, Vec<String>, Vec<String>) {
    (strings(&["gedit"]), strings(&["gnome-calculator"]), strings(&["xdg-open", "."]))
}

fn default_apps() -> Vec<AppEntry> {
    let (notepad, calculator, explorer) = platform_commands();
    vec![
        AppEntry {
            name: "browser".to_string(),
            aliases: strings(&["браузер", "интернет", "browser", "chrome", "firefox", "edge"]),
            command: Vec::new(),
            url: None,
            process_names: strings(&["chrome", "firefox", "msedge"]),
        },
        AppEntry {
            name: "notepad".to_string(),
            aliases: strings(&["блокнот", "notepad", "editor"]),
            command: notepad,
            url: None,
            process_names: strings(&["notepad", "gedit", "textedit"]),
        },
        AppEntry {
            name: "calculator".to_string(),
            aliases: strings(&["калькулятор", "calculator", "calc"]),
            command: calculator,
            url: None,
            process_names: strings(&["calc", "calculator"]),
        },
        AppEntry {
            name: "file manager".to_string(),
            aliases: strings(&["проводник", "explorer", "files"]),
            command: explorer,
            url: None,
            process_names: strings(&["explorer", "nautilus", "finder"]),
        },
        AppEntry {
            name: "steam".to_string(),
            aliases: strings(&["steam", "стим"]),
            command: strings(&["steam"]),
            url: None,
            process_names: strings(&["steam"]),
        },
        AppEntry {
            name: "discord".to_string(),
            aliases: strings(&["discord", "дискорд"]),
            command: strings(&["discord"]),
            url: None,
            process_names: strings(&["discord"]),
        },
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            appearance: AppearanceConfig::default(),
            voice: VoiceConfig::default(),
            ai: AiConfig::default(),
            system: SystemConfig::default(),
            tts: TtsConfig::default(),
            stt: SttConfig::default(),
            apps: default_apps(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            accent_color: default_accent(),
            font_size: default_font_size(),
            animation_enabled: true,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wake_words: default_wake_words(),
            require_wake_word: false,
            language: default_language(),
            timeout_secs: default_listen_timeout(),
            phrase_time_limit_secs: default_phrase_limit(),
            sensitivity: default_sensitivity(),
            pause_ms: default_pause_ms(),
        }
    }
}

impl VoiceConfig {
    /// Two-letter language code, e.g. `ru` for `ru-RU`
    pub fn language_code(&self) -> &str {
        self.language.split(['-', '_']).next().unwrap_or("en")
    }

    /// RMS level of 16-bit samples below which a capture counts as silence.
    /// Sensitivity 10 gives the lowest threshold.
    pub fn energy_threshold(&self) -> u32 {
        energy_threshold(self.sensitivity)
    }
}

pub fn energy_threshold(sensitivity: u8) -> u32 {
    (11 - u32::from(sensitivity.clamp(1, 10))) * 100
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            enable_context: true,
            max_context: default_max_context(),
            command_history_limit: default_command_history_limit(),
            chat_history_limit: default_chat_history_limit(),
            search_url: default_search_url(),
            home_url: default_home_url(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            save_logs: true,
            log_level: default_log_level(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: default_tts_engine(),
            voice: None,
            rate: default_rate(),
            volume: default_volume(),
            emotion: default_emotion(),
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            engines: default_stt_engines(),
            preferred: None,
            recorder: RecorderConfig::default(),
        }
    }
}

impl Default for RecorderConfig {
    #[cfg(target_os = "linux")]
    fn default() -> Self {
        Self {
            program: "arecord".to_string(),
            args: strings(&["-q", "-f", "S16_LE", "-r", "16000", "-c", "1", "-d", "{secs}", "{wav}"]),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn default() -> Self {
        Self {
            program: "sox".to_string(),
            args: strings(&["-q", "-d", "-r", "16000", "-c", "1", "-b", "16", "{wav}", "trim", "0", "{secs}"]),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl PathsConfig {
    /// JSONL file holding the command history
    pub fn command_history_file(&self) -> PathBuf {
        Path::new(&self.data_dir).join("command_history.jsonl")
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| RavenError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file.
    ///
    /// Written to a temporary file next to the target and renamed over it,
    /// so readers never observe a half-written document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let content = serde_json::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Application catalog with URL-less, command-less entries pointed at
    /// `ai.home_url`
    pub fn resolved_apps(&self) -> Vec<AppEntry> {
        self.apps
            .iter()
            .cloned()
            .map(|mut app| {
                if app.url.is_none() && app.command.is_empty() {
                    app.url = Some(self.ai.home_url.clone());
                }
                app
            })
            .collect()
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !THEMES.contains(&self.appearance.theme.as_str()) {
            return Err(RavenError::Config(format!(
                "appearance.theme must be one of {}, got '{}'",
                THEMES.join(", "),
                self.appearance.theme
            )));
        }
        if !is_hex_color(&self.appearance.accent_color) {
            return Err(RavenError::Config(format!(
                "appearance.accent_color must look like #3498db, got '{}'",
                self.appearance.accent_color
            )));
        }
        if !(10..=20).contains(&self.appearance.font_size) {
            return Err(RavenError::Config(format!(
                "appearance.font_size must be between 10 and 20, got {}", self.appearance.font_size
            )));
        }
        if !(50..=300).contains(&self.tts.rate) {
            return Err(RavenError::Config(format!(
                "tts.rate must be between 50 and 300, got {}", self.tts.rate
            )));
        }
        if !(0.0..=1.0).contains(&self.tts.volume) {
            return Err(RavenError::Config(format!(
                "tts.volume must be between 0.0 and 1.0, got {}", self.tts.volume
            )));
        }
        if !(1..=10).contains(&self.voice.sensitivity) {
            return Err(RavenError::Config(format!(
                "voice.sensitivity must be between 1 and 10, got {}", self.voice.sensitivity
            )));
        }
        if self.voice.timeout_secs == 0 || self.voice.phrase_time_limit_secs == 0 {
            return Err(RavenError::Config("voice timeouts must be positive".to_string()));
        }
        if self.ai.max_context == 0
            || self.ai.command_history_limit == 0
            || self.ai.chat_history_limit == 0
        {
            return Err(RavenError::Config("history limits must be positive".to_string()));
        }
        let mut names: Vec<&str> = self.stt.engines.iter().map(|e| e.name()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(RavenError::Config("stt engine names must be unique".to_string()));
        }
        Ok(())
    }

    /// Apply a partial settings document on top of this configuration.
    ///
    /// Objects are merged recursively; any other value replaces the
    /// current one.
    pub fn merged(&self, patch: &Value) -> Result<Self> {
        if !patch.is_object() {
            return Err(RavenError::InvalidRequest("settings patch must be a JSON object".to_string()));
        }
        let mut base = serde_json::to_value(self)?;
        merge_json(&mut base, patch);
        let config: Self = serde_json::from_value(base)
            .map_err(|e| RavenError::InvalidRequest(format!("Invalid settings: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                if let Some(existing) = base_map.get_mut(key) {
                    if existing.is_object() && value.is_object() {
                        merge_json(existing, value);
                        continue;
                    }
                }
                base_map.insert(key.clone(), value.clone());
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}
