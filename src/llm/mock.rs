//! Mock LLM 客户端（无需 API）
//!
//! - MockLlmClient：未配置 API Key 时的离线后端，回一句温和的固定回复，分类请求回 neutral JSON
//! - ScriptedLlmClient：按脚本依次返回预设结果，并记录调用次数与请求，供测试断言
//! - MockEmbedder：按字母频次生成确定性向量

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{CompletionRequest, EmbeddingProvider, LlmClient, LlmError, TokenStream};
use crate::memory::Role;

/// 把整段回复切成带尾随空格的词块，模拟 Token 流
fn word_chunks(content: &str) -> Vec<Result<String, LlmError>> {
    content
        .split_inclusive(' ')
        .map(|w| Ok(w.to_string()))
        .collect()
}

/// Mock 客户端：离线可用的占位后端
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let is_classification = request
            .messages
            .iter()
            .any(|m| m.role == Role::System && m.content.contains("emotion classification"));
        if is_classification {
            return Ok(r#"{"label": "neutral", "score": 0.5}"#.to_string());
        }

        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        if last_user.trim().is_empty() {
            Ok("I'm here with you.".to_string())
        } else {
            Ok("I hear you. Tell me a little more about that.".to_string())
        }
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TokenStream, LlmError> {
        let content = self.complete(request).await?;
        Ok(Box::pin(stream::iter(word_chunks(&content))))
    }
}

/// 脚本化客户端：每次调用弹出一条预设结果；脚本耗尽后返回 fallback
#[derive(Debug)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Result<String, LlmError>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    /// 总是返回同一段文本
    pub fn replying(reply: impl Into<String>) -> Self {
        Self::with_script(Vec::new(), Ok(reply.into()))
    }

    /// 总是失败
    pub fn failing(error: LlmError) -> Self {
        Self::with_script(Vec::new(), Err(error))
    }

    pub fn with_script(
        script: Vec<Result<String, LlmError>>,
        fallback: Result<String, LlmError>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 已发生的调用次数（complete 与 complete_stream 合计）
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 已收到的请求副本
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.next(request)
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TokenStream, LlmError> {
        let content = self.next(request)?;
        Ok(Box::pin(stream::iter(word_chunks(&content))))
    }
}

/// 确定性嵌入：26 维字母频次，L2 归一化
#[derive(Debug, Default)]
pub struct MockEmbedder;

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut v = vec![0f32; 26];
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }
}
