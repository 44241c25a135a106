//! 情绪感知对话 Agent
//!
//! EmotionalAgent 实现 TurnGenerator。一轮对话在后台任务中执行，通过容量为 1 的通道逐个交出 TurnUpdate：
//! Meta 识别 → 情绪分类与平滑 → 意图与人格选择 → 检索 → 组装提示词 → 流式生成。
//! 最后一个更新发出后先关闭通道（客户端立即收到终止事件），再写情绪日志、做反馈学习、写回会话历史。

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures_util::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::config::AppConfig;
use crate::core::{
    AgentError, AgentState, PersonaBadge, SessionState, SessionStore, TurnGenerator, TurnMeta,
    TurnRequest, TurnStream, TurnUpdate,
};
use crate::emotion::{
    average_valence, detect_intent, detect_meta_feedback, global_tone_and_temperature,
    interpret_feedback, stable_emotion_fusion, trend, EmotionRecord, LlmEmotionClassifier,
    MetaSignal, Trend,
};
use crate::llm::{
    create_embedder_from_config, create_llm_from_config, CompletionRequest, EmbeddingProvider,
    LlmClient, MockEmbedder,
};
use crate::memory::{now_timestamp, EmotionLog, EmotionLogEntry, Message, Retriever};
use crate::persona::{
    build_global_persona, select, FeedbackLearner, Persona, PersonaRegistry, PromptBuilder,
    SelectionInput,
};

pub const EMPTY_INPUT_REPORT: &str = "Empty input";

type UpdateSender = mpsc::Sender<Result<TurnUpdate, AgentError>>;

/// 流式生成结束后留给收尾阶段的数据
struct TurnOutcome {
    session: Arc<AsyncMutex<SessionState>>,
    session_id: String,
    user_input: String,
    emotion: String,
    valence: f64,
    previous_valence: Option<f64>,
    trend: Trend,
    persona: String,
    reply: String,
    meta: Option<MetaSignal>,
}

struct AgentCore {
    llm: Arc<dyn LlmClient>,
    registry: Arc<PersonaRegistry>,
    state: Arc<AgentState>,
    sessions: Arc<SessionStore>,
    classifier: LlmEmotionClassifier,
    learner: FeedbackLearner,
    retriever: Arc<Retriever>,
    emotion_log: Arc<EmotionLog>,
    rng: Mutex<StdRng>,
    default_session_id: String,
}

/// 情绪感知多人格 Agent
#[derive(Clone)]
pub struct EmotionalAgent {
    core: Arc<AgentCore>,
}

impl EmotionalAgent {
    pub fn builder(llm: Arc<dyn LlmClient>) -> EmotionalAgentBuilder {
        EmotionalAgentBuilder::new(llm)
    }

    /// 按配置构建：LLM / 嵌入后端、人格表（内置 + extra_personas）、日志与索引路径
    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut registry = PersonaRegistry::builtin();
        for persona in &cfg.agent.extra_personas {
            registry.register(persona.clone());
        }
        EmotionalAgentBuilder::new(create_llm_from_config(cfg))
            .with_embedder(create_embedder_from_config(cfg))
            .with_registry(registry)
            .with_initial_score(cfg.agent.initial_score)
            .with_feedback_window(cfg.agent.feedback_window)
            .with_emotion_log_path(cfg.log.emotion_log_path.clone())
            .with_index_dir(cfg.rag.index_dir.clone())
            .with_top_k(cfg.rag.top_k)
            .with_max_query_chars(cfg.rag.max_query_chars)
            .with_max_context_turns(cfg.app.max_context_turns)
            .with_default_session_id(cfg.app.default_session_id.clone())
            .build()
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.core.registry
    }

    pub fn state(&self) -> &Arc<AgentState> {
        &self.core.state
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.core.sessions
    }

    pub fn emotion_log(&self) -> &Arc<EmotionLog> {
        &self.core.emotion_log
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.core.retriever
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.core.llm
    }

    pub fn default_session_id(&self) -> &str {
        &self.core.default_session_id
    }
}

impl TurnGenerator for EmotionalAgent {
    fn generate(&self, request: TurnRequest) -> TurnStream {
        let (tx, rx) = mpsc::channel(1);
        let core = Arc::clone(&self.core);
        tokio::spawn(async move { core.run_turn(request, tx).await });
        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }
}

impl AgentCore {
    async fn run_turn(&self, request: TurnRequest, tx: UpdateSender) {
        match self.stream_reply(request, &tx).await {
            Ok(Some(outcome)) => {
                drop(tx);
                self.finish_turn(outcome).await;
            }
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            }
        }
    }

    /// 前九步：直到回复流结束。空输入返回 Ok(None)
    async fn stream_reply(
        &self,
        request: TurnRequest,
        tx: &UpdateSender,
    ) -> Result<Option<TurnOutcome>, AgentError> {
        let user_input = request.user_input.trim().to_string();
        if user_input.is_empty() {
            send(tx, TurnUpdate::report_only(EMPTY_INPUT_REPORT)).await;
            return Ok(None);
        }

        let session_id = request
            .session_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.default_session_id.clone());
        let session = self.sessions.get_or_create(&session_id).await;

        // Meta 反馈：先按解释结果更新偏好
        let meta = detect_meta_feedback(&user_input);
        if let Some(signal) = &meta {
            let interpretation = interpret_feedback(&self.llm, &user_input).await;
            if !interpretation.is_empty() {
                self.state.apply_preferences(&interpretation);
                tracing::info!(key = %signal.key, ?interpretation, "preferences updated from meta feedback");
            }
        }

        let reading = self.classifier.detect(&user_input).await;

        let (emotion, valence, previous_valence, turn_trend, avg_valence, tone_hint, temperature, history) = {
            let mut s = session.lock().await;
            let (emotion, valence) = stable_emotion_fusion(
                &reading.label,
                reading.valence,
                reading.score,
                &s.emotion_history,
                meta.is_some(),
            );
            s.emotion_history
                .push(EmotionRecord::new(&user_input, &emotion, valence));
            let (tone_hint, temperature) =
                global_tone_and_temperature(&s.emotion_history, request.tone);
            let history = request
                .history
                .clone()
                .unwrap_or_else(|| s.conversation.messages().to_vec());
            (
                emotion,
                valence,
                s.previous_valence(),
                trend(&s.emotion_history),
                average_valence(&s.emotion_history),
                tone_hint,
                temperature,
                history,
            )
        };

        let intent = detect_intent(&user_input);
        let persona = self.choose_persona(
            request.persona_override.as_deref(),
            &SelectionInput {
                emotion: &emotion,
                intent,
                valence,
                confidence: reading.score,
                previous_valence,
            },
        )?;

        let context = match &persona.retrieval_index {
            Some(index) => self.retriever.retrieve(index, &user_input).await,
            None => String::new(),
        };

        let prefs = self.state.preferences();
        let persona_prompt = PromptBuilder::new(&self.registry).build(
            &persona.name,
            &context,
            &prefs,
            tone_hint,
            &self.state.feedback,
        )?;
        let system_prompt = format!("{}\n\n{}", build_global_persona(&prefs), persona_prompt);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(&user_input));

        let report = format!(
            "**Emotion:** {} ({:.2}) | **Trend:** {} | **Agent:** <span style='color:{}'>{}</span> | **Avg Valence:** {}{:.2}",
            reading.label,
            reading.score,
            turn_trend,
            persona.color,
            persona.name,
            if avg_valence > 0.0 { "+" } else { "" },
            avg_valence
        );
        let badge = PersonaBadge {
            name: persona.name.clone(),
            color: persona.color.clone(),
        };
        let turn_meta = TurnMeta {
            emotion: emotion.clone(),
            score: reading.score,
            valence,
            trend: turn_trend,
            intent,
            meta_mode: meta.is_some(),
        };
        tracing::info!(
            session = %session_id,
            persona = %persona.name,
            emotion = %emotion,
            valence,
            trend = %turn_trend,
            intent = %intent,
            temperature,
            "turn prepared"
        );

        let mut visible = history;
        visible.push(Message::user(&user_input));
        let update = |history: &[Message]| TurnUpdate {
            history: history.to_vec(),
            report: report.clone(),
            artifact: Some(badge.clone()),
            extra: Some(turn_meta.clone()),
        };
        send(tx, update(&visible)).await;

        let completion = CompletionRequest::new(messages)
            .with_temperature(temperature)
            .with_max_tokens(prefs.max_reply_tokens());
        let mut tokens = self
            .llm
            .complete_stream(&completion)
            .await
            .map_err(|e| AgentError::TurnGenerationFailure(e.to_string()))?;

        let mut reply = String::new();
        visible.push(Message::assistant(""));
        while let Some(chunk) = tokens.next().await {
            let chunk = chunk.map_err(|e| AgentError::TurnGenerationFailure(e.to_string()))?;
            reply.push_str(&chunk);
            if let Some(last) = visible.last_mut() {
                last.content.clone_from(&reply);
            }
            send(tx, update(&visible)).await;
        }

        Ok(Some(TurnOutcome {
            session,
            session_id,
            user_input,
            emotion,
            valence,
            previous_valence,
            trend: turn_trend,
            persona: persona.name,
            reply,
            meta,
        }))
    }

    /// 有效的人格覆盖优先，否则按情绪信号选择
    fn choose_persona(
        &self,
        persona_override: Option<&str>,
        input: &SelectionInput<'_>,
    ) -> Result<Persona, AgentError> {
        if let Some(name) = persona_override.filter(|n| !n.is_empty()) {
            if self.registry.contains(name) {
                return self.registry.get(name).cloned();
            }
            tracing::warn!(persona = name, "unknown persona override, selecting automatically");
        }
        let scores = self.state.scores();
        let name = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            select(input, &scores, &mut *rng)
        };
        self.registry.get(&name).cloned()
    }

    /// 收尾：情绪日志、反馈学习、会话历史
    async fn finish_turn(&self, outcome: TurnOutcome) {
        let mut entry = EmotionLogEntry {
            timestamp: Some(now_timestamp()),
            user_input: Some(outcome.user_input.clone()),
            emotion: Some(outcome.emotion.clone()),
            valence: Some(outcome.valence),
            trend: Some(outcome.trend.to_string()),
            agent_used: Some(outcome.persona.clone()),
            ai_reply: Some(outcome.reply.clone()),
            ..Default::default()
        };
        entry
            .extra
            .insert("session_id".to_string(), outcome.session_id.clone().into());
        self.emotion_log.append(entry);

        match &outcome.meta {
            None => {
                self.learner
                    .on_turn_complete(
                        &outcome.persona,
                        outcome.previous_valence,
                        outcome.valence,
                        &outcome.user_input,
                        &outcome.reply,
                    )
                    .await;
            }
            Some(signal) => {
                self.learner
                    .on_meta_feedback(
                        &outcome.persona,
                        &outcome.user_input,
                        &signal.key,
                        &signal.meaning,
                    )
                    .await;
            }
        }

        outcome
            .session
            .lock()
            .await
            .conversation
            .push_turn(&outcome.user_input, &outcome.reply);
    }
}

/// 客户端断开时发送失败，本轮照常完成
async fn send(tx: &UpdateSender, update: TurnUpdate) {
    if tx.send(Ok(update)).await.is_err() {
        tracing::debug!("turn consumer dropped, update discarded");
    }
}

/// EmotionalAgent 构建器
pub struct EmotionalAgentBuilder {
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    registry: PersonaRegistry,
    initial_score: f64,
    feedback_window: usize,
    emotion_log_path: PathBuf,
    index_dir: PathBuf,
    top_k: usize,
    max_query_chars: usize,
    max_context_turns: usize,
    default_session_id: String,
    seed: Option<u64>,
}

impl EmotionalAgentBuilder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let defaults = AppConfig::default();
        Self {
            llm,
            embedder: Arc::new(MockEmbedder),
            registry: PersonaRegistry::builtin(),
            initial_score: defaults.agent.initial_score,
            feedback_window: defaults.agent.feedback_window,
            emotion_log_path: defaults.log.emotion_log_path,
            index_dir: defaults.rag.index_dir,
            top_k: defaults.rag.top_k,
            max_query_chars: defaults.rag.max_query_chars,
            max_context_turns: defaults.app.max_context_turns,
            default_session_id: defaults.app.default_session_id,
            seed: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_registry(mut self, registry: PersonaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_initial_score(mut self, score: f64) -> Self {
        self.initial_score = score;
        self
    }

    pub fn with_feedback_window(mut self, window: usize) -> Self {
        self.feedback_window = window;
        self
    }

    pub fn with_emotion_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.emotion_log_path = path.into();
        self
    }

    pub fn with_index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.index_dir = dir.into();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_max_query_chars(mut self, n: usize) -> Self {
        self.max_query_chars = n;
        self
    }

    pub fn with_max_context_turns(mut self, turns: usize) -> Self {
        self.max_context_turns = turns;
        self
    }

    pub fn with_default_session_id(mut self, id: impl Into<String>) -> Self {
        self.default_session_id = id.into();
        self
    }

    /// 固定随机种子（人格抽样可复现）
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> EmotionalAgent {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = Arc::new(AgentState::new(
            &self.registry,
            self.initial_score,
            self.feedback_window,
        ));
        let core = AgentCore {
            classifier: LlmEmotionClassifier::new(Arc::clone(&self.llm)),
            learner: FeedbackLearner::new(Arc::clone(&self.llm), Arc::clone(&state.feedback)),
            retriever: Arc::new(Retriever::new(
                self.embedder,
                self.index_dir,
                self.top_k,
                self.max_query_chars,
            )),
            emotion_log: Arc::new(EmotionLog::new(self.emotion_log_path)),
            sessions: Arc::new(SessionStore::new(self.max_context_turns)),
            registry: Arc::new(self.registry),
            state,
            llm: self.llm,
            rng: Mutex::new(rng),
            default_session_id: self.default_session_id,
        };
        EmotionalAgent {
            core: Arc::new(core),
        }
    }
}
