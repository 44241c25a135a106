//! LLM 层：客户端抽象与实现（OpenAI 兼容 / NVIDIA / Mock）、嵌入

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use embedding::{EmbeddingProvider, HttpEmbedder};
pub use mock::{MockEmbedder, MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, NEMOTRON_NANO, NVIDIA_BASE_URL, OPENAI_BASE_URL};
pub use traits::{CompletionRequest, LlmClient, LlmError, TokenStream};

/// 读取配置指定的 API Key 环境变量，缺省回退 OPENAI_API_KEY
fn api_key_from_env(cfg: &AppConfig) -> Option<String> {
    std::env::var(&cfg.llm.api_key_env)
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

/// 按 provider 解析端点：显式 base_url 优先；openai 返回 None（官方端点）；其余走 NVIDIA
pub fn resolve_base_url(cfg: &AppConfig) -> Option<&str> {
    match (cfg.llm.provider.to_lowercase().as_str(), cfg.llm.base_url.as_deref()) {
        (_, Some(url)) => Some(url),
        ("openai", None) => None,
        (_, None) => Some(NVIDIA_BASE_URL),
    }
}

fn is_openai(cfg: &AppConfig) -> bool {
    cfg.llm.provider.eq_ignore_ascii_case("openai")
}

fn is_mock(cfg: &AppConfig) -> bool {
    cfg.llm.provider.eq_ignore_ascii_case("mock")
}

/// 根据配置与环境变量选择 LLM 后端（NVIDIA / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match api_key_from_env(cfg) {
        Some(key) if !is_mock(cfg) => {
            tracing::info!("Using {} LLM ({})", cfg.llm.provider, cfg.llm.model);
            Arc::new(OpenAiClient::new(
                resolve_base_url(cfg),
                &cfg.llm.model,
                Some(&key),
            ))
        }
        _ => {
            tracing::warn!("No API key set or provider is mock, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 与 LLM 同源的嵌入客户端；无 Key 时退回 MockEmbedder
pub fn create_embedder_from_config(cfg: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    match api_key_from_env(cfg) {
        Some(key) if !is_mock(cfg) => Arc::new(build_embedder(cfg, &key)),
        _ => Arc::new(MockEmbedder),
    }
}

fn build_embedder(cfg: &AppConfig, key: &str) -> HttpEmbedder {
    let base = resolve_base_url(cfg).unwrap_or(OPENAI_BASE_URL);
    HttpEmbedder::new(base, &cfg.llm.embedding_model, Some(key))
        .with_retrieval_fields(!is_openai(cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(provider: &str, base_url: Option<&str>) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = provider.to_string();
        cfg.llm.base_url = base_url.map(String::from);
        cfg
    }

    #[test]
    fn test_resolve_base_url_by_provider() {
        assert_eq!(resolve_base_url(&cfg("nvidia", None)), Some(NVIDIA_BASE_URL));
        assert_eq!(resolve_base_url(&cfg("openai", None)), None);
        assert_eq!(
            resolve_base_url(&cfg("OpenAI", Some("http://proxy/v1"))),
            Some("http://proxy/v1")
        );
    }

    #[test]
    fn test_embedder_follows_llm_endpoint() {
        assert_eq!(build_embedder(&cfg("openai", None), "k").base_url(), OPENAI_BASE_URL);
        assert_eq!(build_embedder(&cfg("nvidia", None), "k").base_url(), NVIDIA_BASE_URL);
        assert_eq!(
            build_embedder(&cfg("openai", Some("http://proxy/v1/")), "k").base_url(),
            "http://proxy/v1"
        );
    }
}
