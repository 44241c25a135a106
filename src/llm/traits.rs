//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / NVIDIA / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误（传输层 / 服务端 / 空回复 / 流中断）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request error: {0}")]
    Request(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("empty response")]
    EmptyResponse,

    #[error("stream error: {0}")]
    Stream(String),
}

/// 流式 Token：每项是一段增量文本
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// 单次补全请求：model 为空时使用客户端默认模型
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// 只含一条 user 消息的请求（反思、分类、日报等一次性提示）
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(vec![Message::user(content)])
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TokenStream, LlmError>;
}
