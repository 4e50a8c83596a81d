// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Raven: voice assistant with a keyword-matching core
//!
//! Typed or spoken commands are classified, handled by a skill and answered
//! in text and speech. The web dashboard exposes the same assistant over HTTP.

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use raven::config::AppConfig;
use raven::db::Database;
use raven::launcher::{Launcher, OsLauncher};
use raven::speech::{Listener, RecognizerChain, Speaker, VoiceInfo};
use raven::system::{SysinfoProbe, SystemProbe};
use raven::voice::{gate_utterance, VoiceLoop};
use raven::web::{self, AppState};
use raven::{logging, Assistant, RavenError, Result};

/// Words that end an interactive chat
const EXIT_WORDS: &[&str] = &["exit", "quit", "выход", "пока"];

/// Raven CLI - voice assistant
#[derive(Parser, Debug)]
#[command(name = "raven")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Voice assistant with a web dashboard", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to settings file (JSON format)
    #[arg(short, long, default_value = "config/settings.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the web dashboard and API
    Serve {
        /// Host to bind to (overrides settings)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to listen on (overrides settings)
        #[arg(short, long)]
        port: Option<u16>,

        /// Start listening for voice commands right away
        #[arg(long)]
        listen: bool,

        /// Open browser automatically
        #[arg(long)]
        open: bool,
    },

    /// Send one command and print the reply
    Ask {
        /// Command text
        #[arg(required = true)]
        text: Vec<String>,

        /// Print the full reply as JSON
        #[arg(long)]
        json: bool,

        /// Also speak the reply
        #[arg(short, long)]
        speak: bool,
    },

    /// Interactive text chat
    Chat {
        /// Speak replies
        #[arg(short, long)]
        speak: bool,
    },

    /// Listen for voice commands
    Listen {
        /// Capture a single phrase instead of listening continuously
        #[arg(long)]
        once: bool,

        /// Recognizer to try first
        #[arg(short, long)]
        engine: Option<String>,
    },

    /// Speak text aloud
    Say {
        /// Text to speak
        #[arg(required = true)]
        text: Vec<String>,

        /// Voice id (see `raven voices`)
        #[arg(long)]
        voice: Option<String>,

        /// Emotion: neutral, happy, sad, excited, calm, surprised
        #[arg(short, long)]
        emotion: Option<String>,
    },

    /// List voices of the speech engine
    Voices,

    /// Command history operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show system and engine status
    Status,

    /// Create settings, data and log directories
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing settings
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent commands
    List {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config/settings.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Edit configuration in $EDITOR
    Edit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)?;

    let level = if cli.trace {
        Some("trace")
    } else if cli.verbose {
        Some("debug")
    } else if cli.quiet {
        Some("warn")
    } else {
        None
    };
    let _log_guard = logging::init(level, &config);

    if !cli.quiet {
        info!("Raven v{}", env!("CARGO_PKG_VERSION"));
    }

    match cli.command {
        Some(Commands::Serve { host, port, listen, open }) => {
            run_serve(config, &cli.config, host, port, listen, open).await
        }
        Some(Commands::Ask { text, json, speak }) => run_ask(config, &text.join(" "), json, speak).await,
        Some(Commands::Chat { speak }) => run_chat(config, speak).await,
        Some(Commands::Listen { once, engine }) => run_listen(config, once, engine).await,
        Some(Commands::Say { text, voice, emotion }) => {
            run_say(config, &text.join(" "), voice, emotion).await
        }
        Some(Commands::Voices) => run_voices(config).await,
        Some(Commands::History { action }) => run_history_command(config, action),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Init { dir, force }) => run_init(dir, force),
        None => run_serve(config, &cli.config, None, None, false, false).await,
    }
}

/// Run the web server until Ctrl+C or SIGTERM
async fn run_serve(
    mut config: AppConfig,
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    listen: bool,
    open: bool,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(AppState::from_config(config, Some(config_path.to_path_buf()))?);
    info!("Loaded {} skills", state.assistant.skill_names().len());

    if listen {
        match &state.voice_loop {
            Some(voice_loop) => {
                voice_loop.start();
            }
            None => warn!("Voice input is not configured, --listen ignored"),
        }
    }

    if open {
        if let Err(e) = OsLauncher.open_url(&format!("http://{}", addr)) {
            warn!("Failed to open browser: {}", e);
        }
    }

    web::serve(state, &addr, web::shutdown_signal()).await
}

/// Handle one command
async fn run_ask(config: AppConfig, text: &str, json: bool, speak: bool) -> Result<()> {
    let assistant = Assistant::from_config(&config);
    assistant.set_voice_active(false);

    let response = if json {
        let reply = assistant.process_query(text, None).await;
        println!("{}", serde_json::to_string_pretty(&reply)?);
        reply.response
    } else {
        let response = assistant.process_command(text).await?;
        println!("{}", response);
        response
    };

    if speak {
        if let Some(speaker) = assistant.speaker() {
            speaker.speak_and_wait(&response, None).await?;
        }
    }
    Ok(())
}

/// Read commands from stdin until EOF or an exit word
async fn run_chat(config: AppConfig, speak: bool) -> Result<()> {
    let assistant = Assistant::from_config(&config);
    assistant.set_voice_active(false);

    println!("Raven is ready. Type 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = assistant.process_command(line).await?;
        println!("Raven: {}", response);
        if speak {
            if let Some(speaker) = assistant.speaker() {
                speaker.speak_and_wait(&response, None).await?;
            }
        }

        if EXIT_WORDS.contains(&line.to_lowercase().as_str()) {
            break;
        }
    }
    Ok(())
}

/// Listen once or until interrupted
async fn run_listen(config: AppConfig, once: bool, engine: Option<String>) -> Result<()> {
    let listener = Arc::new(Listener::from_config(&config)?);
    if let Some(engine) = engine {
        listener.chain().set_preferred_engine(&engine)?;
    }
    let engines = listener.chain().available_engines();
    if !engines.iter().any(|e| e.available) {
        return Err(RavenError::Recognition(
            "no speech recognition engine is available, check the stt settings".to_string(),
        ));
    }

    let assistant = Arc::new(Assistant::from_config(&config));

    if once {
        // Speak explicitly so the reply finishes before the process exits
        let speak = assistant.is_voice_active();
        assistant.set_voice_active(false);

        println!("Listening...");
        match listener.listen().await? {
            Some(recognition) => {
                println!("Heard ({}): {}", recognition.engine, recognition.text);
                if let Some(command) = gate_utterance(&recognition.text, &config.voice.wake_words, false) {
                    let response = assistant.process_command(&command).await?;
                    println!("Raven: {}", response);
                    if let (true, Some(speaker)) = (speak, assistant.speaker()) {
                        speaker.speak_and_wait(&response, None).await?;
                    }
                }
            }
            None => println!("No speech detected"),
        }
        return Ok(());
    }

    let voice_loop = VoiceLoop::new(Arc::clone(&assistant), listener, &config.voice);
    voice_loop.start();
    println!(
        "Listening for {}. Press Ctrl+C to stop.",
        config.voice.wake_words.join(", ")
    );
    web::shutdown_signal().await;
    voice_loop.stop().await;
    if let Some(speaker) = assistant.speaker() {
        speaker.stop();
    }
    Ok(())
}

async fn run_say(config: AppConfig, text: &str, voice: Option<String>, emotion: Option<String>) -> Result<()> {
    let speaker = Speaker::from_config(&config.tts);
    if voice.is_some() {
        speaker.set_voice(voice);
    }
    if let Some(emotion) = &emotion {
        speaker.set_emotion(emotion)?;
    }
    speaker.speak_and_wait(text, None).await
}

async fn run_voices(config: AppConfig) -> Result<()> {
    let speaker = Speaker::from_config(&config.tts);
    let voices = speaker.voices().await?;

    println!("Voices for {} ({}):", speaker.engine_name(), voices.len());
    for voice in &voices {
        println!("{}", voice_row(voice));
    }
    Ok(())
}

fn voice_row(voice: &VoiceInfo) -> String {
    format!(
        "  {:<24} {:<8} {}",
        voice.id,
        voice.language.as_deref().unwrap_or("-"),
        voice.name
    )
}

/// Run history commands
fn run_history_command(config: AppConfig, action: HistoryCommands) -> Result<()> {
    let history = raven::history::History::new(
        config.paths.command_history_file(),
        config.ai.command_history_limit,
    );

    match action {
        HistoryCommands::List { count } => {
            let entries = history.get_recent(count)?;
            println!("Recent commands ({} entries):", entries.len());
            for entry in entries {
                println!(
                    "  {} {} -> {}",
                    entry.time.format("%Y-%m-%d %H:%M"),
                    entry.command,
                    entry.response
                );
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            config.validate()?;
            println!("Configuration at {:?} is valid", config_path);
            println!("  Wake words: {:?}", config.voice.wake_words);
            println!("  Language: {}", config.voice.language);
            println!("  Speech engine: {:?}", config.tts.engine);
            println!("  Recognizers: {}", config.stt.engines.len());
            println!("  Applications: {}", config.apps.len());
        }
        ConfigCommands::Edit => {
            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
            std::process::Command::new(editor).arg(config_path).status()?;
            AppConfig::load(config_path)?;
            println!("Configuration at {:?} is valid", config_path);
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig) -> Result<()> {
    println!("Raven v{} Status", env!("CARGO_PKG_VERSION"));
    println!("==================");

    let probe = SysinfoProbe::new();
    match tokio::task::spawn_blocking(move || probe.snapshot()).await? {
        Ok(s) => println!(
            "System: CPU {:.1}%, RAM {:.1}%, disk {:.1}%, {} processes",
            s.cpu_percent, s.ram_percent, s.disk_percent, s.processes
        ),
        Err(e) => println!("System: Error - {}", e),
    }

    let speaker = Speaker::from_config(&config.tts);
    println!("\nSpeech output: {}", speaker.engine_name());

    println!("\nRecognizers:");
    match RecognizerChain::from_config(&config.stt) {
        Ok(chain) => {
            for engine in chain.available_engines() {
                let marker = if engine.available { "✓" } else { "✗" };
                println!("  {} {}", marker, engine.name);
            }
        }
        Err(e) => println!("  Error - {}", e),
    }

    match Database::open(&config.database.path) {
        Ok(db) => {
            let stats = db.get_stats()?;
            println!("\nDatabase ({}):", config.database.path);
            println!("  Conversations: {}", stats.conversation_count);
            println!("  Messages: {}", stats.message_count);
        }
        Err(e) => println!("\nDatabase: ✗ Error - {}", e),
    }

    println!("\nConfiguration:");
    println!("  Wake words: {:?}", config.voice.wake_words);
    println!("  Voice enabled: {}", config.voice.enabled);
    println!("  Server: http://{}:{}", config.server.host, config.server.port);

    Ok(())
}

/// Create settings, data and log directories
fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config").join("settings.json");

    if config_path.exists() && !force {
        return Err(RavenError::Config(
            "config/settings.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    let mut config = AppConfig::default();
    config.paths.data_dir = target.join("data").to_string_lossy().into_owned();
    config.paths.log_dir = target.join("logs").to_string_lossy().into_owned();
    config.database.path = target.join("data").join("raven.db").to_string_lossy().into_owned();

    std::fs::create_dir_all(&config.paths.data_dir)?;
    std::fs::create_dir_all(&config.paths.log_dir)?;
    config.save(&config_path)?;

    println!("Raven initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config/settings.json");
    println!("  - data/");
    println!("  - logs/");
    println!("\nNext steps:");
    println!("  1. Check engines: raven status");
    println!("  2. Start the dashboard: raven serve --open");

    Ok(())
}
