//! EmoAI Web 服务
//!
//! 启动: cargo run --bin emoai-web --features web
//! 流式对话: POST http://127.0.0.1:8010/api/chat/stream（SSE，每条事件为一个 JSON StreamEvent）

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use emoai::config::{load_config, AppConfig};
use emoai::core::{run_turn, TurnRequest};
use emoai::memory::{EmotionLogEntry, Message, Role};
use emoai::persona::Persona;
use emoai::report::{generate_daily_report, sort_newest_first, DailyReport};
use emoai::{observability, EmotionalAgent};

const DEFAULT_TONE: f32 = 0.6;

struct AppState {
    agent: EmotionalAgent,
    config: AppConfig,
}

impl AppState {
    /// 按配置选择严格或宽松读取
    fn read_emotion_log(&self) -> Vec<EmotionLogEntry> {
        let log = self.agent.emotion_log();
        if self.config.log.lenient_read {
            let read = log.read_all_lenient();
            if read.skipped > 0 {
                tracing::warn!(skipped = read.skipped, "skipped malformed emotion log lines");
            }
            read.entries
        } else {
            log.read_all()
        }
    }
}

/// 流式对话请求；user_input 与 messages 二选一
#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    user_input: Option<String>,
    /// 完整对话；最后一条 user 消息作为本轮输入，其之前的消息作为历史
    #[serde(default)]
    messages: Option<Vec<Message>>,
    #[serde(default, alias = "tone_level")]
    tone: Option<f32>,
    #[serde(default)]
    agent_override: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

impl ChatRequest {
    fn into_turn_request(self) -> TurnRequest {
        let (user_input, history) = match (self.user_input, self.messages) {
            (Some(input), messages) if !input.trim().is_empty() => (input, messages),
            (_, Some(mut messages)) => match messages.iter().rposition(|m| m.role == Role::User) {
                Some(idx) => {
                    let input = messages.remove(idx).content;
                    messages.truncate(idx);
                    messages.retain(|m| m.role != Role::System);
                    (input, Some(messages))
                }
                None => (String::new(), None),
            },
            _ => (String::new(), None),
        };

        let mut request = TurnRequest::new(user_input).with_tone(self.tone.unwrap_or(DEFAULT_TONE));
        if let Some(history) = history {
            request = request.with_history(history);
        }
        if let Some(persona) = self.agent_override.filter(|s| !s.is_empty()) {
            request = request.with_persona(persona);
        }
        if let Some(session_id) = self.session_id.filter(|s| !s.is_empty()) {
            request = request.with_session(session_id);
        }
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("config load failed, using defaults: {}", e);
        AppConfig::default()
    });
    let agent = EmotionalAgent::from_config(&config);
    tracing::info!(
        personas = ?agent.registry().names(),
        log = %config.log.emotion_log_path.display(),
        "agent ready"
    );

    let port = config.web.port;
    let state = Arc::new(AppState { agent, config });

    let app = Router::new()
        .route("/api/chat/stream", post(api_chat_stream))
        .route("/api/emotion_log", get(api_emotion_log))
        .route("/api/emotion_stats/today", get(api_emotion_stats_today))
        .route("/api/personas", get(api_personas))
        .route("/api/health", get(|| async { "OK" }))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("EmoAI Web: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// POST /api/chat/stream：一轮对话的事件流，最后一条 is_final 为 true
async fn api_chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request = req.into_turn_request();
    let request_id = uuid::Uuid::new_v4();
    tracing::info!(%request_id, session = ?request.session_id, "chat stream started");

    let events = run_turn(&state.agent, request).map(move |ev| {
        if ev.is_final {
            tracing::info!(%request_id, failed = ev.error.is_some(), "chat stream finished");
        }
        let event = Event::default().json_data(&ev).unwrap_or_else(|e| {
            tracing::error!(%request_id, "event serialization failed: {}", e);
            Event::default().data(r#"{"reply_chunk":"","report":"","is_final":true}"#)
        });
        Ok(event)
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    )
}

/// GET /api/emotion_log：全部日志，新的在前
async fn api_emotion_log(State(state): State<Arc<AppState>>) -> Json<Vec<EmotionLogEntry>> {
    Json(sort_newest_first(state.read_emotion_log()))
}

/// GET /api/emotion_stats/today：今日统计、与昨日对比、AI 日报
async fn api_emotion_stats_today(State(state): State<Arc<AppState>>) -> Json<DailyReport> {
    let entries = state.read_emotion_log();
    let today = chrono::Local::now().date_naive();
    Json(generate_daily_report(state.agent.llm(), &entries, today).await)
}

/// GET /api/personas：已注册人格
async fn api_personas(State(state): State<Arc<AppState>>) -> Json<Vec<Persona>> {
    Json(state.agent.registry().iter().cloned().collect())
}
