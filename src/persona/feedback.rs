//! 反馈学习：把用户情绪变化与 Meta 反馈转成一句反思，写入人格反馈记忆
//!
//! - 情绪效价变化 |Δ| < 0.05 视为噪声，不调用 LLM
//! - Δ > 0 让 LLM 总结「做对了什么」，否则总结「下次避免什么」
//! - Meta 反馈让 LLM 写一句以 "I should..." / "I will try to..." 开头的改进句，再做格式规整

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::memory::FeedbackMemory;
use crate::text;

/// 小于该幅度的效价变化不产生反思
pub const VALENCE_NOISE: f64 = 0.05;

/// Meta 反思前缀
pub const META_MARKER: &str = "[Meta Feedback] ";

const REFLECTION_TEMPERATURE: f32 = 0.3;
const REFLECTION_MAX_TOKENS: u32 = 80;
const META_MAX_TOKENS: u32 = 60;

/// 一次学习的结果
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    /// 变化太小，未调用 LLM
    Skipped,
    /// 已写入记忆的反思
    Recorded(String),
}

pub struct FeedbackLearner {
    llm: Arc<dyn LlmClient>,
    memory: Arc<FeedbackMemory>,
    model: Option<String>,
}

impl FeedbackLearner {
    pub fn new(llm: Arc<dyn LlmClient>, memory: Arc<FeedbackMemory>) -> Self {
        Self {
            llm,
            memory,
            model: None,
        }
    }

    /// 反思用的模型（默认沿用客户端模型）
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn memory(&self) -> &Arc<FeedbackMemory> {
        &self.memory
    }

    fn request(&self, prompt: String, max_tokens: u32) -> CompletionRequest {
        let mut req = CompletionRequest::user(prompt)
            .with_temperature(REFLECTION_TEMPERATURE)
            .with_max_tokens(max_tokens);
        if let Some(model) = &self.model {
            req = req.with_model(model.clone());
        }
        req
    }

    /// 一轮结束后按效价变化生成反思
    pub async fn try_on_turn_complete(
        &self,
        persona: &str,
        previous_valence: Option<f64>,
        new_valence: f64,
        user_input: &str,
        reply: &str,
    ) -> Result<FeedbackOutcome, AgentError> {
        let delta = new_valence - previous_valence.unwrap_or(0.0);
        if delta.abs() < VALENCE_NOISE {
            tracing::debug!(persona, delta, "valence change below noise, no reflection");
            return Ok(FeedbackOutcome::Skipped);
        }

        let user_input = text::normalize(user_input);
        let reply = text::normalize(reply);
        let prompt = if delta > 0.0 {
            format!(
                "The user's emotional state improved after your last message.\n\
                 User said: \"{}\"\n\
                 Your reply was: \"{}\"\n\
                 Describe in one concise sentence what you did well, so you can repeat it next time.",
                user_input, reply
            )
        } else {
            format!(
                "The user's emotional state got worse or stayed negative after your last message.\n\
                 User said: \"{}\"\n\
                 Your reply was: \"{}\"\n\
                 Describe in one concise sentence what to avoid next time to prevent emotional decline.",
                user_input, reply
            )
        };

        let reflection = self
            .llm
            .complete(&self.request(prompt, REFLECTION_MAX_TOKENS))
            .await?;
        let reflection = reflection.trim();
        if reflection.is_empty() {
            return Err(LlmError::EmptyResponse.into());
        }
        self.memory.push(persona, reflection);
        tracing::info!(persona, delta, "reflection recorded: {}", reflection);
        Ok(FeedbackOutcome::Recorded(reflection.to_string()))
    }

    /// 同 try_on_turn_complete，失败只记日志
    pub async fn on_turn_complete(
        &self,
        persona: &str,
        previous_valence: Option<f64>,
        new_valence: f64,
        user_input: &str,
        reply: &str,
    ) -> FeedbackOutcome {
        self.try_on_turn_complete(persona, previous_valence, new_valence, user_input, reply)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(persona, "reflection skipped: {}", e);
                FeedbackOutcome::Skipped
            })
    }

    /// 根据用户对回复风格的评价生成一条改进句
    pub async fn try_on_meta_feedback(
        &self,
        persona: &str,
        user_input: &str,
        meta_key: &str,
        meta_meaning: &str,
    ) -> Result<FeedbackOutcome, AgentError> {
        let prompt = format!(
            "The user provided feedback about your behavior: \"{}\"\n\
             This feedback implies: \"{}\" (Keyword: {})\n\n\
             Based on this, describe in one concise sentence a specific action you should take or avoid in the future to better meet the user's preference. \
             Start your sentence with \"I should...\" or \"I will try to...\".\n\
             Example: If user said \"too long\", you might say \"I should provide more concise answers.\"\n\
             Example: If user said \"too formal\", you might say \"I will try to use a friendlier tone.\"",
            text::normalize(user_input),
            meta_meaning,
            meta_key
        );

        let raw = self
            .llm
            .complete(&self.request(prompt, META_MAX_TOKENS))
            .await?;
        let reflection = postprocess_meta(&raw).ok_or(LlmError::EmptyResponse)?;
        self.memory.push(persona, reflection.clone());
        tracing::info!(persona, meta_key, "meta reflection recorded: {}", reflection);
        Ok(FeedbackOutcome::Recorded(reflection))
    }

    /// 同 try_on_meta_feedback，失败只记日志
    pub async fn on_meta_feedback(
        &self,
        persona: &str,
        user_input: &str,
        meta_key: &str,
        meta_meaning: &str,
    ) -> FeedbackOutcome {
        self.try_on_meta_feedback(persona, user_input, meta_key, meta_meaning)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(persona, meta_key, "meta reflection skipped: {}", e);
                FeedbackOutcome::Skipped
            })
    }
}

/// 规整 Meta 反思：去引号，补 "I should" 前缀，只留第一句，加标记
///
/// 清洗后为空时返回 None。
pub fn postprocess_meta(raw: &str) -> Option<String> {
    let cleaned = text::normalize(raw);
    let unquoted = cleaned
        .strip_prefix(['"', '\''])
        .unwrap_or(&cleaned);
    let unquoted = unquoted.strip_suffix(['"', '\'']).unwrap_or(unquoted).trim();
    if unquoted.is_empty() {
        return None;
    }

    let lower = unquoted.to_lowercase();
    let sentence = if lower.starts_with("i should") || lower.starts_with("i will") {
        capitalize_first(unquoted)
    } else {
        format!("I should {}", lowercase_first(unquoted))
    };

    let first = sentence.split('.').next().unwrap_or_default().trim_end();
    Some(format!("{}{}.", META_MARKER, first))
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
