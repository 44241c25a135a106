//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `EMOAI__*` 覆盖（双下划线表示嵌套，如 `EMOAI__WEB__PORT=9000`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::persona::Persona;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub log: LogSection,
    pub rag: RagSection,
    pub web: WebSection,
}

/// [app] 段：应用名、默认会话、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 未指定 session_id 的请求落到这个会话
    #[serde(default = "default_session_id")]
    pub default_session_id: String,
    /// 对话历史保留轮数（短期记忆）
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_session_id: default_session_id(),
            max_context_turns: default_max_context_turns(),
        }
    }
}

fn default_session_id() -> String {
    "default_session".to_string()
}

fn default_max_context_turns() -> usize {
    20
}

/// [llm] 段：后端选择、模型、端点与 Key 所在的环境变量
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// nvidia / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 未设置时 nvidia 走 integrate 端点，openai 走官方端点
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_provider() -> String {
    "nvidia".to_string()
}

fn default_model() -> String {
    crate::llm::NEMOTRON_NANO.to_string()
}

fn default_api_key_env() -> String {
    "NVIDIA_API_KEY".to_string()
}

fn default_embedding_model() -> String {
    "nvidia/llama-3.2-nv-embedqa-1b-v2".to_string()
}

/// [agent] 段：人格初始分数、反馈记忆窗口、额外人格
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_initial_score")]
    pub initial_score: f64,
    /// 每个人格保留的反思条数上限
    #[serde(default = "default_feedback_window")]
    pub feedback_window: usize,
    /// 追加到内置三人格之后；同名覆盖
    #[serde(default)]
    pub extra_personas: Vec<Persona>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            initial_score: default_initial_score(),
            feedback_window: default_feedback_window(),
            extra_personas: Vec::new(),
        }
    }
}

fn default_initial_score() -> f64 {
    20.0
}

fn default_feedback_window() -> usize {
    20
}

/// [log] 段：情绪日志路径与读取模式
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_emotion_log_path")]
    pub emotion_log_path: PathBuf,
    /// true 时逐行跳过坏行；false 时任一坏行使整次读取返回空
    #[serde(default)]
    pub lenient_read: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            emotion_log_path: default_emotion_log_path(),
            lenient_read: false,
        }
    }
}

fn default_emotion_log_path() -> PathBuf {
    PathBuf::from("data/logs/emotion_log.jsonl")
}

/// [rag] 段：索引目录、召回条数、查询截断长度
#[derive(Debug, Clone, Deserialize)]
pub struct RagSection {
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            top_k: default_top_k(),
            max_query_chars: default_max_query_chars(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("data/indexes")
}

fn default_top_k() -> usize {
    3
}

fn default_max_query_chars() -> usize {
    4000
}

/// [web] 段
#[derive(Debug, Clone, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    8010
}

/// 从 config 目录加载配置，环境变量 EMOAI__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 EMOAI__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("EMOAI")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
