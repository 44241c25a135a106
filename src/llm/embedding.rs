//! 嵌入 API：供检索上下文使用，调用 OpenAI 兼容的 /embeddings 端点
//!
//! NVIDIA 的检索嵌入模型要求额外的 `input_type` 字段，async-openai 的请求结构无法携带，故直接用 reqwest。
//! OpenAI 官方端点不接受这些字段，需关闭 retrieval_fields。

use async_trait::async_trait;
use serde::Deserialize;

use crate::llm::LlmError;

/// 嵌入提供方：将文本编码为向量
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// 基于 reqwest 的嵌入客户端
#[derive(Clone)]
pub struct HttpEmbedder {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    /// 是否携带 NVIDIA 检索字段（input_type / truncate）
    retrieval_fields: bool,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            retrieval_fields: true,
        }
    }

    pub fn with_retrieval_fields(mut self, enabled: bool) -> Self {
        self.retrieval_fields = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "input": text,
            "model": self.model,
            "encoding_format": "float",
        });
        if self.retrieval_fields {
            body["input_type"] = "query".into();
            body["truncate"] = "NONE".into();
        }
        body
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let body = self.request_body(text);
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{}: {}", status, detail)));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or(LlmError::EmptyResponse)
    }
}
