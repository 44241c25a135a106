//! EmoAI - 情绪感知的多人格对话后端
//!
//! 模块划分：
//! - **agent**: EmotionalAgent，一轮对话的完整流水线（情绪 → 人格 → 检索 → 流式回复 → 学习）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、会话与人格状态、流式事件编排
//! - **emotion**: 情绪分类、意图识别、平滑融合与趋势、Meta 反馈识别
//! - **llm**: LLM 与嵌入客户端抽象及实现（OpenAI 兼容 / NVIDIA / Mock）
//! - **memory**: 对话历史、情绪日志、反馈记忆、检索索引
//! - **persona**: 人格注册表、提示词、选择器、偏好与反馈学习
//! - **report**: 情绪日志统计与每日报告
//! - **text**: 文本清洗与切块

pub mod agent;
pub mod config;
pub mod core;
pub mod emotion;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod persona;
pub mod report;
pub mod text;

pub use agent::{EmotionalAgent, EmotionalAgentBuilder};
pub use config::{load_config, AppConfig};
