// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! JSON API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::{ApiJson, ApiResult, AppState, ChatEntry};
use crate::config::AppConfig;
use crate::system::ProcessSort;
use crate::text_tools;
use crate::voice::gate_utterance;
use crate::RavenError;

const DEFAULT_CHAT_HISTORY: usize = 50;
const DEFAULT_PROCESS_LIMIT: usize = 20;

/// Identifier of the built-in keyword engine
const CORE_MODEL: &str = "raven_core";

fn invalid(message: impl Into<String>) -> RavenError {
    RavenError::InvalidRequest(message.into())
}

fn no_microphone() -> RavenError {
    RavenError::Recognition("voice input is not configured".to_string())
}

fn no_speaker() -> RavenError {
    RavenError::Speech("voice output is not available".to_string())
}

#[derive(Deserialize)]
pub(super) struct LimitQuery {
    limit: Option<usize>,
}

// === Assistant ===

pub(super) async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "timestamp": Utc::now(),
    }))
}

#[derive(Deserialize)]
pub(super) struct CommandRequest {
    #[serde(default)]
    command: String,
}

pub(super) async fn command(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CommandRequest>,
) -> ApiResult<Json<Value>> {
    let response = state.assistant.process_command(&request.command).await?;
    Ok(Json(json!({
        "success": true,
        "response": response,
        "command": request.command.trim(),
        "timestamp": Utc::now(),
    })))
}

#[derive(Deserialize)]
pub(super) struct ChatRequest {
    #[serde(default)]
    message: String,
    model: Option<String>,
    #[serde(default)]
    settings: Value,
    context: Option<Value>,
}

pub(super) async fn chat(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<Json<Value>> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(invalid("No message provided").into());
    }

    let model = request.model.unwrap_or_else(|| state.config().ai.model);
    let reply = state.assistant.process_query(message, request.context).await;

    let history_length = {
        let mut log = state.lock_chat();
        log.push(ChatEntry {
            user: message.to_string(),
            ai: reply.response.clone(),
            model: model.clone(),
            intent: reply.intent.to_string(),
            settings: request.settings,
            timestamp: reply.timestamp,
        });
        log.len()
    };

    let mut body = serde_json::to_value(&reply).map_err(RavenError::from)?;
    if let Value::Object(map) = &mut body {
        map.insert("success".to_string(), json!(true));
        map.insert("model".to_string(), json!(model));
        map.insert("history_length".to_string(), json!(history_length));
    }
    Ok(Json(body))
}

/// The models list is informational; every model name is served by the
/// local keyword engine
pub(super) async fn models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = state.config();
    Json(json!({
        "success": true,
        "models": [{
            "id": CORE_MODEL,
            "name": "Raven Core",
            "description": "Built-in keyword engine",
            "local": true,
            "skills": state.assistant.skill_names(),
            "max_context": config.ai.max_context,
        }],
        "default_model": config.ai.model,
    }))
}

pub(super) async fn chat_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Json<Value> {
    let log = state.lock_chat();
    let history = log.tail(query.limit.unwrap_or(DEFAULT_CHAT_HISTORY));
    Json(json!({
        "success": true,
        "history": history,
        "total": log.len(),
    }))
}

pub(super) async fn clear_chat_history(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cleared = state.lock_chat().clear();
    state.assistant.clear_context();
    info!("Chat history cleared ({} entries)", cleared);
    Json(json!({
        "success": true,
        "message": "Chat history cleared",
        "cleared": cleared,
    }))
}

pub(super) async fn ai_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let probe = state.assistant.probe();
    let memory_mb = tokio::task::spawn_blocking(move || probe.own_memory_mb()).await?.ok();
    let config = state.config();
    let speaker = state.assistant.speaker();

    Ok(Json(json!({
        "success": true,
        "status": "online",
        "model": config.ai.model,
        "skills": state.assistant.skill_names(),
        "context_size": state.assistant.context().len(),
        "max_context": config.ai.max_context,
        "chat_history_count": state.lock_chat().len(),
        "memory_usage_mb": memory_mb,
        "voice_active": state.assistant.is_voice_active(),
        "listening": state.is_listening(),
        "speech_queue": speaker.map(|s| s.queue_len()).unwrap_or(0),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "timestamp": Utc::now(),
    })))
}

#[derive(Deserialize)]
pub(super) struct TextRequest {
    #[serde(default)]
    text: String,
    target_lang: Option<String>,
}

pub(super) async fn analyze(ApiJson(request): ApiJson<TextRequest>) -> ApiResult<Json<Value>> {
    let analysis = text_tools::analyze(&request.text)?;
    Ok(Json(json!({
        "success": true,
        "analysis": analysis,
        "timestamp": Utc::now(),
    })))
}

pub(super) async fn summarize(ApiJson(request): ApiJson<TextRequest>) -> ApiResult<Json<Value>> {
    let summary = text_tools::summarize(&request.text)?;
    Ok(Json(json!({
        "success": true,
        "summary": summary.summary,
        "original_length": summary.original_length,
        "summary_length": summary.summary_length,
        "reduction_percent": summary.reduction_percent,
        "timestamp": Utc::now(),
    })))
}

pub(super) async fn translate(ApiJson(request): ApiJson<TextRequest>) -> ApiResult<Json<Value>> {
    let target = request.target_lang.as_deref().unwrap_or("en");
    let translation = text_tools::translate(&request.text, target)?;
    Ok(Json(json!({
        "success": true,
        "original": translation.original,
        "translation": translation.translation,
        "target_language": translation.target_language,
        "timestamp": Utc::now(),
    })))
}

// === System ===

pub(super) async fn metrics(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let probe = state.assistant.probe();
    let metrics = tokio::task::spawn_blocking(move || probe.metrics()).await??;

    let mut body = serde_json::to_value(&metrics).map_err(RavenError::from)?;
    if let Value::Object(map) = &mut body {
        map.insert("success".to_string(), json!(true));
    }
    Ok(Json(body))
}

#[derive(Deserialize)]
pub(super) struct ProcessQuery {
    limit: Option<usize>,
    sort_by: Option<String>,
}

pub(super) async fn processes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProcessQuery>,
) -> ApiResult<Json<Value>> {
    let sort: ProcessSort = match query.sort_by.as_deref() {
        Some(key) => key.parse()?,
        None => ProcessSort::default(),
    };
    let limit = query.limit.unwrap_or(DEFAULT_PROCESS_LIMIT);

    let probe = state.assistant.probe();
    let processes = tokio::task::spawn_blocking(move || probe.processes(sort, limit)).await??;

    Ok(Json(json!({
        "success": true,
        "processes": processes,
        "total": processes.len(),
        "timestamp": Utc::now(),
    })))
}

#[derive(Deserialize)]
pub(super) struct ActionRequest {
    #[serde(default)]
    action: String,
    #[serde(default)]
    params: Value,
}

pub(super) async fn system_action(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ActionRequest>,
) -> ApiResult<Json<Value>> {
    let probe = state.assistant.probe();

    let result = match request.action.as_str() {
        "clean_ram" => {
            let dropped = state.assistant.clear_context();
            let memory_mb = tokio::task::spawn_blocking(move || probe.own_memory_mb()).await??;
            json!({
                "message": "Memory cleaned up",
                "details": format!("Dropped {} cached conversation turns", dropped),
                "memory_mb": memory_mb,
            })
        }
        "get_system_info" => {
            let info = tokio::task::spawn_blocking(move || probe.system_info()).await??;
            serde_json::to_value(info).map_err(RavenError::from)?
        }
        "kill_process" => {
            let pid = request
                .params
                .get("pid")
                .and_then(Value::as_u64)
                .ok_or_else(|| invalid("No process PID provided"))?;
            let pid = u32::try_from(pid).map_err(|_| invalid(format!("Invalid PID {}", pid)))?;

            let name = tokio::task::spawn_blocking(move || probe.terminate(pid)).await??;
            info!("Terminated process {} ({})", pid, name);
            json!({ "message": format!("Process {} ({}) terminated", pid, name) })
        }
        other => return Err(invalid(format!("Action '{}' is not supported", other)).into()),
    };

    Ok(Json(json!({
        "success": true,
        "action": request.action,
        "result": result,
        "timestamp": Utc::now(),
    })))
}

pub(super) async fn command_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let history = state.assistant.history();
    let history = history.get_recent(query.limit.unwrap_or(history.limit()))?;
    Ok(Json(json!({
        "success": true,
        "total": history.len(),
        "history": history,
    })))
}

pub(super) async fn clear_command_history(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state.assistant.history().clear()?;
    info!("Command history cleared");
    Ok(Json(json!({ "success": true, "message": "Command history cleared" })))
}

// === Settings ===

pub(super) async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "success": true, "settings": state.config() }))
}

pub(super) async fn update_settings(
    State(state): State<Arc<AppState>>,
    ApiJson(patch): ApiJson<Value>,
) -> ApiResult<Json<Value>> {
    let config = state.update_config(|current| current.merged(&patch))?;
    Ok(Json(json!({ "success": true, "settings": config })))
}

pub(super) async fn reset_settings(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let config = state.update_config(|_| Ok(AppConfig::default()))?;
    info!("Settings reset to defaults");
    Ok(Json(json!({
        "success": true,
        "message": "Settings reset to defaults",
        "settings": config,
    })))
}

// === Voice ===

pub(super) async fn voice_listen(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let listener = state.listener.as_ref().ok_or_else(no_microphone)?;

    let Some(recognition) = listener.listen().await? else {
        return Ok(Json(json!({
            "success": true,
            "recognized": false,
            "message": "No speech detected",
        })));
    };

    // The user asked to be heard, so no wake word is required here
    let wake_words = state.config().voice.wake_words;
    let response = match gate_utterance(&recognition.text, &wake_words, false) {
        Some(command) => Some(state.assistant.process_command(&command).await?),
        None => None,
    };

    Ok(Json(json!({
        "success": true,
        "recognized": true,
        "text": recognition.text,
        "engine": recognition.engine,
        "response": response,
    })))
}

pub(super) async fn voice_start(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let voice_loop = state.voice_loop.as_ref().ok_or_else(no_microphone)?;
    let started = voice_loop.start();
    Ok(Json(json!({
        "success": true,
        "listening": true,
        "started": started,
    })))
}

pub(super) async fn voice_stop(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stopped = match &state.voice_loop {
        Some(voice_loop) => voice_loop.stop().await,
        None => false,
    };
    if let Some(speaker) = state.assistant.speaker() {
        speaker.stop();
    }
    Json(json!({
        "success": true,
        "listening": false,
        "stopped": stopped,
    }))
}

#[derive(Deserialize)]
pub(super) struct SpeakRequest {
    #[serde(default)]
    text: String,
    voice: Option<String>,
    emotion: Option<String>,
}

pub(super) async fn voice_speak(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SpeakRequest>,
) -> ApiResult<Json<Value>> {
    if request.text.trim().is_empty() {
        return Err(invalid("No text provided").into());
    }
    if let Some(emotion) = &request.emotion {
        if !crate::speech::tts::EMOTIONS.contains(&emotion.as_str()) {
            return Err(invalid(format!("Unknown emotion '{}'", emotion)).into());
        }
    }

    let speaker = state.assistant.speaker().ok_or_else(no_speaker)?;
    let queued = speaker.speak(&request.text, request.voice.as_deref(), request.emotion.as_deref())?;
    Ok(Json(json!({
        "success": true,
        "queued": queued,
        "queue_length": speaker.queue_len(),
    })))
}

#[derive(Deserialize)]
pub(super) struct OutputRequest {
    enabled: bool,
}

/// Turn spoken replies on or off
pub(super) async fn voice_output(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<OutputRequest>,
) -> Json<Value> {
    let active = state.assistant.set_voice_active(request.enabled);
    Json(json!({ "success": true, "voice_active": active }))
}

pub(super) async fn voice_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let speaker = state.assistant.speaker();
    let listener = state.listener.as_ref();

    Json(json!({
        "success": true,
        "voice_active": state.assistant.is_voice_active(),
        "listening": state.is_listening(),
        "capturing": listener.is_some_and(|l| l.is_capturing()),
        "speaking": speaker.is_some_and(|s| s.is_speaking()),
        "queue_length": speaker.map(|s| s.queue_len()).unwrap_or(0),
        "tts_engine": speaker.map(|s| s.engine_name()),
        "tts_settings": speaker.map(|s| s.settings()),
        "stt_engines": listener.map(|l| l.chain().available_engines()).unwrap_or_default(),
        "language": listener.map(|l| l.language()),
        "last_recognition": listener.and_then(|l| l.chain().last_result()),
    }))
}

pub(super) async fn voices(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let speaker = state.assistant.speaker().ok_or_else(no_speaker)?;
    let voices = speaker.voices().await?;
    Ok(Json(json!({
        "success": true,
        "engine": speaker.engine_name(),
        "voices": voices,
    })))
}

// === Conversations ===

pub(super) async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Value>> {
    let conversations = state.db.list_conversations(query.limit)?;
    let stats = state.db.get_stats()?;
    Ok(Json(json!({
        "success": true,
        "conversations": conversations,
        "stats": stats,
    })))
}

#[derive(Deserialize)]
pub(super) struct NewConversation {
    title: Option<String>,
}

pub(super) async fn create_conversation(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<NewConversation>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let conversation = state.db.create_conversation(request.title.as_deref())?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "conversation": conversation })),
    ))
}

pub(super) async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let conversation = state.db.get_conversation(&id)?;
    let messages = state.db.get_messages(&id)?;
    Ok(Json(json!({
        "success": true,
        "conversation": conversation,
        "messages": messages,
    })))
}

pub(super) async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.db.delete_conversation(&id)?;
    Ok(Json(json!({ "success": true, "message": format!("Conversation {} deleted", id) })))
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Deserialize)]
pub(super) struct NewMessage {
    #[serde(default)]
    content: String,
    #[serde(default = "default_role")]
    role: String,
}

/// Store a message. A user message is answered by the assistant and the
/// reply is stored too.
pub(super) async fn add_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<NewMessage>,
) -> ApiResult<Json<Value>> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(invalid("No message content provided").into());
    }

    let message = state.db.add_message(&id, &request.role, content)?;
    if request.role != "user" {
        return Ok(Json(json!({ "success": true, "message": message, "reply": null })));
    }

    let reply = state.assistant.process_query(content, None).await;
    let stored = state.db.add_message(&id, "assistant", &reply.response)?;
    Ok(Json(json!({
        "success": true,
        "message": message,
        "reply": stored,
        "intent": reply.intent,
    })))
}
