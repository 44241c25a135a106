//! Agent 错误类型
//!
//! 与调用方约定：UnknownPersona 必须上抛；CompletionFailure 由反馈学习器局部吞掉、由报告路径转成占位文本；
//! TurnGenerationFailure 变成流式输出中唯一的终止错误事件；LogIo 只记录日志，不打断对话。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("Completion failed: {0}")]
    CompletionFailure(#[from] LlmError),

    #[error("Turn generation failed: {0}")]
    TurnGenerationFailure(String),

    #[error("Emotion log I/O failed: {0}")]
    LogIo(String),

    #[error("Retrieval index I/O failed: {0}")]
    IndexIo(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::ConfigError(e.to_string())
    }
}
