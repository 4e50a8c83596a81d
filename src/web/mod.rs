// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP API and server-rendered pages for Raven

mod api;
mod pages;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::assistant::Assistant;
use crate::config::AppConfig;
use crate::db::Database;
use crate::history::RingLog;
use crate::speech::tts::EMOTIONS;
use crate::speech::Listener;
use crate::voice::VoiceLoop;
use crate::{RavenError, Result};

/// One exchange on the chat page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub user: String,
    pub ai: String,
    pub model: String,
    pub intent: String,
    #[serde(default)]
    pub settings: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Shared application state
pub struct AppState {
    pub assistant: Arc<Assistant>,
    pub listener: Option<Arc<Listener>>,
    pub voice_loop: Option<VoiceLoop>,
    pub db: Database,
    pub started_at: DateTime<Utc>,
    config: RwLock<AppConfig>,
    config_path: Option<PathBuf>,
    chat_log: Mutex<RingLog<ChatEntry>>,
}

impl AppState {
    /// `config_path` is where settings changes are saved; `None` keeps them
    /// in memory only
    pub fn new(
        config: AppConfig,
        config_path: Option<PathBuf>,
        assistant: Arc<Assistant>,
        listener: Option<Arc<Listener>>,
        db: Database,
    ) -> Self {
        let voice_loop = listener
            .as_ref()
            .map(|l| VoiceLoop::new(Arc::clone(&assistant), Arc::clone(l), &config.voice));

        Self {
            assistant,
            listener,
            voice_loop,
            db,
            started_at: Utc::now(),
            chat_log: Mutex::new(RingLog::new(config.ai.chat_history_limit)),
            config: RwLock::new(config),
            config_path,
        }
    }

    /// State wired to the real OS, speech engines and database.
    /// Must be called inside a tokio runtime.
    pub fn from_config(config: AppConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let db = Database::open(&config.database.path)?;
        let assistant = Arc::new(Assistant::from_config(&config));
        let listener = match Listener::from_config(&config) {
            Ok(listener) => Some(Arc::new(listener)),
            Err(e) => {
                warn!("Voice input disabled: {}", e);
                None
            }
        };
        Ok(Self::new(config, config_path, assistant, listener, db))
    }

    /// Snapshot of the current settings
    pub fn config(&self) -> AppConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Compute new settings from the current ones, persist them and apply
    /// the parts that can change at runtime. The config stays write-locked
    /// from read to store.
    pub fn update_config<F>(&self, update: F) -> Result<AppConfig>
    where
        F: FnOnce(&AppConfig) -> Result<AppConfig>,
    {
        let mut current = self.config.write().unwrap_or_else(|e| e.into_inner());
        let config = update(&*current)?;
        if !EMOTIONS.contains(&config.tts.emotion.as_str()) {
            return Err(RavenError::InvalidRequest(format!(
                "unknown emotion '{}', expected one of {}",
                config.tts.emotion,
                EMOTIONS.join(", ")
            )));
        }
        if let Some(path) = &self.config_path {
            config.save(path)?;
            info!("Settings saved to {:?}", path);
        }

        if let Some(speaker) = self.assistant.speaker() {
            speaker.set_rate(config.tts.rate);
            speaker.set_volume(config.tts.volume);
            speaker.set_voice(config.tts.voice.clone());
            speaker.set_emotion(&config.tts.emotion)?;
        }
        if let Some(listener) = &self.listener {
            listener.set_sensitivity(config.voice.sensitivity);
        }
        // A runtime voice-output toggle survives unrelated settings changes
        if config.voice.enabled != current.voice.enabled {
            self.assistant.set_voice_active(config.voice.enabled);
        }
        self.lock_chat().set_capacity(config.ai.chat_history_limit);

        *current = config.clone();
        Ok(config)
    }

    fn lock_chat(&self) -> MutexGuard<'_, RingLog<ChatEntry>> {
        self.chat_log.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_listening(&self) -> bool {
        self.voice_loop.as_ref().is_some_and(VoiceLoop::is_listening)
    }
}

/// Error returned by API handlers, rendered as `{"success": false, "error": ...}`
#[derive(Debug)]
pub struct ApiError(RavenError);

impl From<RavenError> for ApiError {
    fn from(e: RavenError) -> Self {
        Self(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self(RavenError::Task(e))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RavenError::InvalidRequest(rejection.body_text()))
    }
}

/// `Json` body extractor whose rejections use the API error shape
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// HTTP status for an error variant
pub fn status_for(e: &RavenError) -> StatusCode {
    match e {
        RavenError::InvalidRequest(_) | RavenError::Config(_) => StatusCode::BAD_REQUEST,
        RavenError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        RavenError::NotFound(_) | RavenError::ProcessNotFound(_) => StatusCode::NOT_FOUND,
        RavenError::Busy(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "success": false, "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Pages
        .route("/", get(dashboard_page))
        .route("/chat", get(chat_page))
        .route("/voice", get(voice_page))
        .route("/system", get(system_page))
        .route("/settings", get(settings_page))
        // Assistant
        .route("/api/health", get(api::health))
        .route("/api/command", post(api::command))
        .route("/api/ai/chat", post(api::chat))
        .route("/api/ai/models", get(api::models))
        .route("/api/ai/history", get(api::chat_history).delete(api::clear_chat_history))
        .route("/api/ai/status", get(api::ai_status))
        .route("/api/ai/analyze", post(api::analyze))
        .route("/api/ai/summarize", post(api::summarize))
        .route("/api/ai/translate", post(api::translate))
        // System
        .route("/api/system/metrics", get(api::metrics))
        .route("/api/system/processes", get(api::processes))
        .route("/api/system/actions", post(api::system_action))
        .route("/api/commands/history", get(api::command_history).delete(api::clear_command_history))
        // Settings
        .route("/api/settings", get(api::get_settings).put(api::update_settings))
        .route("/api/settings/reset", post(api::reset_settings))
        // Voice
        .route("/api/voice/listen", post(api::voice_listen))
        .route("/api/voice/start", post(api::voice_start))
        .route("/api/voice/stop", post(api::voice_stop))
        .route("/api/voice/speak", post(api::voice_speak))
        .route("/api/voice/output", post(api::voice_output))
        .route("/api/voice/status", get(api::voice_status))
        .route("/api/voice/voices", get(api::voices))
        // Conversations
        .route("/api/conversations", get(api::list_conversations).post(api::create_conversation))
        .route("/api/conversations/:id", get(api::get_conversation).delete(api::delete_conversation))
        .route("/api/conversations/:id/messages", post(api::add_message))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Page Handlers ===

async fn dashboard_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let probe = state.assistant.probe();
    let snapshot = tokio::task::spawn_blocking(move || probe.snapshot())
        .await
        .ok()
        .and_then(|r| r.ok());
    let recent = state.assistant.history().get_recent(10).unwrap_or_default();

    Html(pages::render_dashboard(
        &state.config().appearance,
        snapshot.as_ref(),
        &recent,
        state.assistant.is_voice_active(),
        state.is_listening(),
    ))
}

async fn chat_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let entries = state.lock_chat().tail(0);
    Html(pages::render_chat(&state.config().appearance, &entries))
}

async fn voice_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let engines = state
        .listener
        .as_ref()
        .map(|l| l.chain().available_engines())
        .unwrap_or_default();
    let tts_engine = state.assistant.speaker().map(|s| s.engine_name().to_string());

    Html(pages::render_voice(
        &state.config().appearance,
        &engines,
        tts_engine.as_deref(),
        state.assistant.is_voice_active(),
        state.is_listening(),
    ))
}

async fn system_page(State(state): State<Arc<AppState>>) -> Html<String> {
    let probe = state.assistant.probe();
    let gathered = tokio::task::spawn_blocking(move || {
        let metrics = probe.metrics().ok();
        let processes = probe
            .processes(crate::system::ProcessSort::Cpu, 20)
            .unwrap_or_default();
        let info = probe.system_info().ok();
        (metrics, processes, info)
    })
    .await;

    let (metrics, processes, info) = gathered.unwrap_or_default();
    Html(pages::render_system(
        &state.config().appearance,
        metrics.as_ref(),
        &processes,
        info.as_ref(),
    ))
}

async fn settings_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(pages::render_settings(&state.config()))
}

/// Resolve when Ctrl+C or SIGTERM arrives
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Serve `state` on `addr` until `shutdown` resolves
pub async fn serve<F>(state: Arc<AppState>, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Raven available at http://{}", listener.local_addr()?);

    let router = create_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RavenError::Config(format!("Server error: {}", e)))?;

    if let Some(voice_loop) = &state.voice_loop {
        voice_loop.stop().await;
    }
    if let Some(speaker) = state.assistant.speaker() {
        speaker.stop();
    }
    Ok(())
}

/// Start the web server from settings, stopping on Ctrl+C or SIGTERM
pub async fn start_server(config: AppConfig, config_path: Option<PathBuf>) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::from_config(config, config_path)?);
    serve(state, &addr, shutdown_signal()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::testing::{FakeLauncher, FakeProbe};
    use crate::speech::tts::testing::RecordingEngine;
    use crate::speech::{Speaker, VoiceSettings};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    struct Harness {
        _dir: tempfile::TempDir,
        settings_path: PathBuf,
        state: Arc<AppState>,
        probe: Arc<FakeProbe>,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.paths.data_dir = dir.path().to_string_lossy().into_owned();
        let settings_path = dir.path().join("config").join("settings.json");

        let probe = Arc::new(FakeProbe::with_processes(&["bash", "firefox"]));
        let speaker = Arc::new(Speaker::new(
            Arc::new(RecordingEngine::default()),
            VoiceSettings::from(&config.tts),
        ));
        let assistant = Arc::new(Assistant::new(
            &config,
            probe.clone(),
            Arc::new(FakeLauncher::default()),
            Some(speaker),
        ));
        let state = Arc::new(AppState::new(
            config,
            Some(settings_path.clone()),
            assistant,
            None,
            Database::in_memory().unwrap(),
        ));

        Harness { _dir: dir, settings_path, state, probe }
    }

    async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = create_router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn send_raw(state: &Arc<AppState>, uri: &str, content_type: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = create_router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_bad_bodies_get_json_errors() {
        let h = harness();

        let (status, body) = send_raw(&h.state, "/api/command", "application/json", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("JSON"));

        let (status, body) = send_raw(&h.state, "/api/voice/output", "application/json", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("enabled"));

        let (status, body) = send_raw(&h.state, "/api/ai/chat", "text/plain", "hello").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_settings_keep_runtime_voice_toggle() {
        let h = harness();
        let (_, body) = send(&h.state, "POST", "/api/voice/output", Some(json!({"enabled": false}))).await;
        assert_eq!(body["voice_active"], false);

        let (status, _) = send(&h.state, "PUT", "/api/settings", Some(json!({"tts": {"rate": 190}}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!h.state.assistant.is_voice_active());

        send(&h.state, "PUT", "/api/settings", Some(json!({"voice": {"enabled": false}}))).await;
        send(&h.state, "PUT", "/api/settings", Some(json!({"voice": {"enabled": true}}))).await;
        assert!(h.state.assistant.is_voice_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_settings_updates_merge() {
        let h = harness();
        let patches = [
            json!({"tts": {"rate": 210}}),
            json!({"voice": {"pause_ms": 900}}),
            json!({"appearance": {"theme": "dark"}}),
            json!({"ai": {"max_context": 4}}),
        ];

        let tasks: Vec<_> = patches
            .into_iter()
            .map(|patch| {
                let state = Arc::clone(&h.state);
                tokio::spawn(async move { send(&state, "PUT", "/api/settings", Some(patch)).await.0 })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), StatusCode::OK);
        }

        let config = h.state.config();
        assert_eq!(config.tts.rate, 210);
        assert_eq!(config.voice.pause_ms, 900);
        assert_eq!(config.appearance.theme, "dark");
        assert_eq!(config.ai.max_context, 4);
        assert_eq!(AppConfig::load(&h.settings_path).unwrap(), config);
    }

    #[tokio::test]
    async fn test_pages_use_appearance_settings() {
        let h = harness();
        send(
            &h.state,
            "PUT",
            "/api/settings",
            Some(json!({"appearance": {"theme": "dark", "accent_color": "#e67e22"}})),
        )
        .await;

        let request = Request::builder().uri("/chat").body(Body::empty()).unwrap();
        let response = create_router(Arc::clone(&h.state)).oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8_lossy(&bytes);
        assert!(html.contains("--accent:#e67e22"));
        assert!(html.contains("--bg:#1a1a2e"));
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = send(&h.state, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_command_endpoint() {
        let h = harness();
        let (status, body) =
            send(&h.state, "POST", "/api/command", Some(json!({"command": "спасибо"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["command"], "спасибо");
        assert!(!body["response"].as_str().unwrap().is_empty());

        let (status, body) = send(&h.state, "GET", "/api/commands/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);

        let (status, body) = send(&h.state, "POST", "/api/command", Some(json!({"command": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, _) = send(&h.state, "DELETE", "/api/commands/history", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&h.state, "GET", "/api/commands/history", None).await;
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_chat_log_round_trip() {
        let h = harness();
        let (status, body) =
            send(&h.state, "POST", "/api/ai/chat", Some(json!({"message": "который час"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["intent"], "time");
        assert_eq!(body["skill"], "datetime");
        assert_eq!(body["history_length"], 1);

        let (_, body) = send(&h.state, "GET", "/api/ai/history", None).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["history"][0]["user"], "который час");

        let (_, body) = send(&h.state, "DELETE", "/api/ai/history", None).await;
        assert_eq!(body["cleared"], 1);

        let (status, _) = send(&h.state, "POST", "/api/ai/chat", Some(json!({"message": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_text_tools_endpoints() {
        let h = harness();
        let (status, body) =
            send(&h.state, "POST", "/api/ai/translate", Some(json!({"text": "привет мир"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["translation"], "hello world");

        let (status, _) = send(
            &h.state,
            "POST",
            "/api/ai/translate",
            Some(json!({"text": "привет", "target_lang": "xx"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            send(&h.state, "POST", "/api/ai/analyze", Some(json!({"text": "Hello there."}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analysis"]["word_count"], 2);
    }

    #[tokio::test]
    async fn test_system_actions() {
        let h = harness();
        let (status, body) = send(
            &h.state,
            "POST",
            "/api/system/actions",
            Some(json!({"action": "kill_process", "params": {"pid": 101}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["action"], "kill_process");
        assert_eq!(*h.probe.terminated.lock().unwrap(), vec![101]);

        let (status, _) = send(
            &h.state,
            "POST",
            "/api/system/actions",
            Some(json!({"action": "kill_process", "params": {"pid": 999}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &h.state,
            "POST",
            "/api/system/actions",
            Some(json!({"action": "kill_process", "params": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            send(&h.state, "POST", "/api/system/actions", Some(json!({"action": "reboot"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (_, body) = send(
            &h.state,
            "POST",
            "/api/system/actions",
            Some(json!({"action": "get_system_info"})),
        )
        .await;
        assert_eq!(body["result"]["hostname"], "test-host");
    }

    #[tokio::test]
    async fn test_processes_and_metrics() {
        let h = harness();
        let (status, body) =
            send(&h.state, "GET", "/api/system/processes?limit=1&sort_by=name", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["processes"][0]["name"], "bash");

        let (status, _) = send(&h.state, "GET", "/api/system/processes?sort_by=size", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&h.state, "GET", "/api/system/metrics", None).await;
        assert_eq!(body["cpu"]["cores"], 8);
    }

    #[tokio::test]
    async fn test_settings_update_is_saved() {
        let h = harness();
        let (status, body) =
            send(&h.state, "PUT", "/api/settings", Some(json!({"tts": {"rate": 200}}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["settings"]["tts"]["rate"], 200);

        let saved = AppConfig::load(&h.settings_path).unwrap();
        assert_eq!(saved.tts.rate, 200);
        assert_eq!(h.state.assistant.speaker().unwrap().settings().rate, 200);

        let (status, _) =
            send(&h.state, "PUT", "/api/settings", Some(json!({"tts": {"rate": 1000}}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(h.state.config().tts.rate, 200);

        let (status, body) = send(&h.state, "POST", "/api/settings/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["settings"]["tts"]["rate"], AppConfig::default().tts.rate);
    }

    #[tokio::test]
    async fn test_voice_endpoints_without_microphone() {
        let h = harness();
        let (status, _) = send(&h.state, "POST", "/api/voice/listen", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = send(&h.state, "POST", "/api/voice/speak", Some(json!({"text": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &h.state,
            "POST",
            "/api/voice/speak",
            Some(json!({"text": "hi", "emotion": "furious"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&h.state, "POST", "/api/voice/speak", Some(json!({"text": "hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["queued"], true);

        let (_, body) = send(&h.state, "GET", "/api/voice/status", None).await;
        assert_eq!(body["listening"], false);
        assert_eq!(body["tts_engine"], "recording");
    }

    #[tokio::test]
    async fn test_conversation_flow() {
        let h = harness();
        let (status, body) =
            send(&h.state, "POST", "/api/conversations", Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["conversation"]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/conversations/{}/messages", id);
        let (status, body) = send(&h.state, "POST", &uri, Some(json!({"content": "привет"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"]["role"], "assistant");

        let uri = format!("/api/conversations/{}", id);
        let (_, body) = send(&h.state, "GET", &uri, None).await;
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["conversation"]["title"], "привет");

        let (status, _) = send(&h.state, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&h.state, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pages_render() {
        let h = harness();
        for uri in ["/", "/chat", "/voice", "/system", "/settings"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = create_router(Arc::clone(&h.state)).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert!(String::from_utf8_lossy(&bytes).contains("Raven"));
        }
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&RavenError::Busy("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_for(&RavenError::ProcessNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&RavenError::PermissionDenied("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&RavenError::Speech("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
