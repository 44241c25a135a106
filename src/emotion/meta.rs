//! Meta 反馈：用户在评价助手本身（太长、太正式、你是 AI 吗……）而非聊内容
//!
//! 识别走短语表 + 兜底词表；解释交给 LLM，输出 JSON 形式的偏好调整。

use std::sync::Arc;

use serde::Serialize;

use crate::emotion::classifier::extract_json_object;
use crate::emotion::intent::contains_any_word;
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::persona::PreferenceInterpretation;
use crate::text;

/// 识别到的 Meta 反馈：关键词与其含义
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaSignal {
    pub key: String,
    pub meaning: String,
}

/// 按顺序匹配的短语（子串包含）
const META_PATTERNS: [(&str, &str); 7] = [
    ("shorter", "User prefers shorter replies."),
    ("longer", "User prefers longer replies."),
    ("too formal", "User prefers a more casual tone."),
    ("too casual", "User prefers a more professional tone."),
    ("speak slower", "User wants more structured explanations."),
    ("more emotional", "User wants richer emotional responses."),
    ("less emotional", "User prefers neutral tone."),
];

pub const GENERAL_META: &str = "general_meta";
const GENERAL_META_MEANING: &str = "User is reflecting about the model or its behavior.";
const GENERAL_META_WORDS: &[&str] = &[
    "you", "your", "model", "ai", "prompt", "too long", "not human", "why you",
];

const INTERPRET_TEMPERATURE: f32 = 0.2;
const INTERPRET_MAX_TOKENS: u32 = 100;

pub fn detect_meta_feedback(text: &str) -> Option<MetaSignal> {
    let lower = text.trim().to_lowercase();
    if let Some((key, meaning)) = META_PATTERNS.iter().find(|(k, _)| lower.contains(k)) {
        return Some(MetaSignal {
            key: key.to_string(),
            meaning: meaning.to_string(),
        });
    }
    if contains_any_word(&lower, GENERAL_META_WORDS) {
        return Some(MetaSignal {
            key: GENERAL_META.to_string(),
            meaning: GENERAL_META_MEANING.to_string(),
        });
    }
    None
}

fn interpret_prompt(user_input: &str) -> String {
    format!(
        "You are a feedback analyzer for a conversational AI system.\n\
         The user just said: \"{}\"\n\
         Infer what the user is implicitly asking the chatbot to adjust.\n\n\
         Possible feedback dimensions:\n\
         - reply_length: short / long / unchanged\n\
         - tone: warmer / calmer / more_humorous / unchanged\n\
         - positivity: increase / decrease / unchanged\n\
         - empathy: increase / decrease / unchanged\n\n\
         Respond with a short valid JSON object only.\n\
         Example: {{\"reply_length\":\"short\",\"tone\":\"warmer\"}}",
        text::normalize(user_input)
    )
}

/// 让 LLM 解释用户反馈；无 JSON 或解析失败视为错误
pub async fn try_interpret_feedback(
    llm: &Arc<dyn LlmClient>,
    user_input: &str,
) -> Result<PreferenceInterpretation, LlmError> {
    let request = CompletionRequest::user(interpret_prompt(user_input))
        .with_temperature(INTERPRET_TEMPERATURE)
        .with_max_tokens(INTERPRET_MAX_TOKENS);
    let raw = llm.complete(&request).await?;
    let json = extract_json_object(&raw)
        .ok_or_else(|| LlmError::Api(format!("no JSON in interpretation: {}", raw)))?;
    serde_json::from_str(&json).map_err(|e| LlmError::Api(e.to_string()))
}

/// 同上，失败返回空解释
pub async fn interpret_feedback(
    llm: &Arc<dyn LlmClient>,
    user_input: &str,
) -> PreferenceInterpretation {
    try_interpret_feedback(llm, user_input)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("meta feedback interpretation failed: {}", e);
            PreferenceInterpretation::default()
        })
}
