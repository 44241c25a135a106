//! 情绪分类
//!
//! LLM 按 27 个标签分类并给出置信度；调用或解析失败时退回关键词规则（置信度 0.4）。
//! 文本中的表情符号会把效价向表情的平均效价拉 30%。

use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::emotion::intent::contains_any_word;
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::memory::Message;
use crate::text;

/// 标签 → 效价
pub const VALENCE_TABLE: [(&str, f64); 27] = [
    ("joy", 1.0),
    ("love", 0.9),
    ("gratitude", 0.8),
    ("optimism", 0.7),
    ("admiration", 0.7),
    ("caring", 0.6),
    ("approval", 0.5),
    ("pride", 0.5),
    ("neutral", 0.0),
    ("realization", 0.2),
    ("curiosity", 0.1),
    ("surprise", 0.2),
    ("confusion", -0.2),
    ("remorse", -0.6),
    ("sadness", -0.8),
    ("grief", -0.9),
    ("fear", -0.9),
    ("nervousness", -0.7),
    ("disappointment", -0.6),
    ("anger", -1.0),
    ("disgust", -0.9),
    ("embarrassment", -0.5),
    ("relief", 0.4),
    ("amusement", 0.8),
    ("excitement", 0.9),
    ("desire", 0.7),
    ("annoyance", -0.4),
];

const EMOJI_VALENCE: [(char, f64); 16] = [
    ('😊', 0.8),
    ('😍', 0.9),
    ('😄', 0.8),
    ('😢', -0.9),
    ('😭', -1.0),
    ('😡', -0.9),
    ('💔', -0.9),
    ('😱', -0.8),
    ('😞', -0.7),
    ('😔', -0.6),
    ('❤', 0.9),
    ('💗', 0.8),
    ('🤗', 0.7),
    ('🤩', 0.8),
    ('😶', 0.0),
    ('😕', -0.3),
];

pub const NEUTRAL: &str = "neutral";
const FALLBACK_SCORE: f64 = 0.4;
const MISSING_SCORE: f64 = 0.5;
const CLASSIFY_TEMPERATURE: f32 = 0.1;
const CLASSIFY_MAX_TOKENS: u32 = 50;

pub fn valence_of(label: &str) -> Option<f64> {
    VALENCE_TABLE
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, v)| *v)
}

/// 一次分类结果：标签、置信度、（表情修正后的）效价
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionReading {
    pub label: String,
    pub score: f64,
    pub valence: f64,
}

impl EmotionReading {
    fn from_label(label: &str, score: f64, raw_text: &str) -> Self {
        let base = valence_of(label).unwrap_or(0.0);
        Self {
            label: label.to_string(),
            score,
            valence: emoji_adjusted_valence(raw_text, base),
        }
    }
}

/// 有表情时：0.7 * base + 0.3 * 表情平均效价
pub fn emoji_adjusted_valence(text: &str, base: f64) -> f64 {
    let found: Vec<f64> = text
        .chars()
        .filter_map(|c| EMOJI_VALENCE.iter().find(|(e, _)| *e == c).map(|(_, v)| *v))
        .collect();
    if found.is_empty() {
        return base;
    }
    let mean = found.iter().sum::<f64>() / found.len() as f64;
    0.7 * base + 0.3 * mean
}

/// 关键词兜底：joy / sadness / anger / fear / surprise / neutral
pub fn keyword_fallback(text: &str) -> &'static str {
    const RULES: [(&str, &[&str]); 5] = [
        ("joy", &["happy", "good", "great", "awesome", "love", "like", "yay", "fun"]),
        ("sadness", &["sad", "bad", "cry", "depressed", "unhappy", "lonely", "hurt"]),
        ("anger", &["angry", "mad", "hate", "furious", "annoyed"]),
        ("fear", &["scared", "afraid", "fear", "worry", "worried", "anxious"]),
        ("surprise", &["wow", "omg", "surprise"]),
    ];
    RULES
        .iter()
        .find(|(_, words)| contains_any_word(text, words))
        .map(|(label, _)| *label)
        .unwrap_or(NEUTRAL)
}

/// 从模型输出中取出第一个 `{` 到最后一个 `}` 之间的 JSON 文本（去掉代码围栏）
pub fn extract_json_object(raw: &str) -> Option<String> {
    let stripped = raw.replace("```json", "").replace("```", "");
    let re = Regex::new(r"(?s)\{.*\}").ok()?;
    re.find(&stripped).map(|m| m.as_str().to_string())
}

fn classification_prompt() -> String {
    let labels: Vec<&str> = VALENCE_TABLE.iter().map(|(l, _)| *l).collect();
    format!(
        "You are an emotion classification API.\n\
         Classify the user's text into ONE of the following emotions:\n\
         [{}]\n\n\
         Return a JSON object: {{\"label\": \"emotion_name\", \"score\": 0.95}}\n\
         Score should be between 0.0 and 1.0 representing confidence.\n\
         If unsure, use \"neutral\".",
        labels.join(", ")
    )
}

/// LLM 情绪分类器
pub struct LlmEmotionClassifier {
    llm: Arc<dyn LlmClient>,
}

impl LlmEmotionClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 调用 LLM 并解析；不做兜底
    pub async fn try_detect(&self, text: &str) -> Result<EmotionReading, LlmError> {
        let request = CompletionRequest::new(vec![
            Message::system(classification_prompt()),
            Message::user(text::normalize(text)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let raw = self.llm.complete(&request).await?;
        let json = extract_json_object(&raw)
            .ok_or_else(|| LlmError::Api(format!("no JSON in classification: {}", raw)))?;
        let value: Value =
            serde_json::from_str(&json).map_err(|e| LlmError::Api(e.to_string()))?;

        let label = value
            .get("label")
            .and_then(Value::as_str)
            .map(|l| l.trim().to_lowercase())
            .filter(|l| valence_of(l).is_some())
            .unwrap_or_else(|| NEUTRAL.to_string());
        let score = value
            .get("score")
            .and_then(Value::as_f64)
            .unwrap_or(MISSING_SCORE);
        Ok(EmotionReading::from_label(&label, score, text))
    }

    /// 分类；失败时退回关键词规则
    pub async fn detect(&self, text: &str) -> EmotionReading {
        match self.try_detect(text).await {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!("emotion classification failed, using keyword fallback: {}", e);
                EmotionReading::from_label(keyword_fallback(text), FALLBACK_SCORE, text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    #[test]
    fn test_table_covers_27_labels() {
        assert_eq!(VALENCE_TABLE.len(), 27);
        assert_eq!(valence_of("anger"), Some(-1.0));
        assert_eq!(valence_of("bliss"), None);
    }

    #[test]
    fn test_emoji_adjustment() {
        assert_eq!(emoji_adjusted_valence("plain text", 0.5), 0.5);
        let v = emoji_adjusted_valence("so sad 😢😭", 0.0);
        assert!((v - 0.3 * -0.95).abs() < 1e-9);
    }

    #[test]
    fn test_keyword_fallback() {
        assert_eq!(keyword_fallback("I feel so lonely tonight"), "sadness");
        assert_eq!(keyword_fallback("WOW"), "surprise");
        assert_eq!(keyword_fallback("the bus was late"), NEUTRAL);
    }

    #[test]
    fn test_extract_json_strips_fences() {
        let raw = "```json\n{\"label\": \"joy\", \"score\": 0.9}\n```";
        assert_eq!(
            extract_json_object(raw).unwrap(),
            "{\"label\": \"joy\", \"score\": 0.9}"
        );
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[tokio::test]
    async fn test_detect_parses_llm_json() {
        let llm = Arc::new(ScriptedLlmClient::replying(r#"{"label": "Gratitude", "score": 0.92}"#));
        let reading = LlmEmotionClassifier::new(llm.clone()).detect("thank you 😊").await;
        assert_eq!(reading.label, "gratitude");
        assert_eq!(reading.score, 0.92);
        assert!((reading.valence - (0.7 * 0.8 + 0.3 * 0.8)).abs() < 1e-9);

        let req = &llm.requests()[0];
        assert_eq!(req.temperature, Some(0.1));
        assert_eq!(req.messages[1].content, "thank you");
    }

    #[tokio::test]
    async fn test_unknown_label_and_missing_score() {
        let llm = Arc::new(ScriptedLlmClient::replying(r#"{"label": "bliss"}"#));
        let reading = LlmEmotionClassifier::new(llm).detect("hmm").await;
        assert_eq!(reading.label, NEUTRAL);
        assert_eq!(reading.score, 0.5);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_keywords() {
        let llm = Arc::new(ScriptedLlmClient::failing(LlmError::Request("down".into())));
        let reading = LlmEmotionClassifier::new(llm).detect("I am so angry").await;
        assert_eq!(reading.label, "anger");
        assert_eq!(reading.score, 0.4);
        assert_eq!(reading.valence, -1.0);

        let garbled = Arc::new(ScriptedLlmClient::replying("joy, probably"));
        let reading = LlmEmotionClassifier::new(garbled).detect("great day").await;
        assert_eq!(reading.label, "joy");
        assert_eq!(reading.score, 0.4);
    }
}
