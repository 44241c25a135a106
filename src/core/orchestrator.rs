//! 流式轮次编排
//!
//! TurnGenerator 对一轮对话产出有限的 TurnUpdate 序列（历史、报告、人格徽标、元数据）；
//! stream_turn 把它转成客户端看到的事件流：每个更新一条非终止事件，结束后一条终止事件；
//! 生成器中途出错时只发一条带 error 的终止事件，然后结束。

use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;

use crate::core::AgentError;
use crate::emotion::{Intent, Trend};
use crate::memory::{Message, Role};

/// 错误事件中给客户端的通用报告
pub const SERVER_ERROR_REPORT: &str = "An error occurred on the server.";
/// 第一个更新到达前的报告占位
pub const STREAMING_REPORT: &str = "Streaming...";

/// 发给客户端的一条事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    pub reply_chunk: String,
    pub report: String,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamEvent {
    pub fn partial(reply: impl Into<String>, report: impl Into<String>) -> Self {
        Self {
            reply_chunk: reply.into(),
            report: report.into(),
            is_final: false,
            error: None,
        }
    }

    pub fn finished(reply: impl Into<String>, report: impl Into<String>) -> Self {
        Self {
            is_final: true,
            ..Self::partial(reply, report)
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            reply_chunk: String::new(),
            report: SERVER_ERROR_REPORT.to_string(),
            is_final: true,
            error: Some(error.into()),
        }
    }
}

/// 本轮人格徽标（前端着色用）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaBadge {
    pub name: String,
    pub color: String,
}

/// 本轮情绪元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnMeta {
    pub emotion: String,
    pub score: f64,
    pub valence: f64,
    pub trend: Trend,
    pub intent: Intent,
    pub meta_mode: bool,
}

/// 生成器的一次产出
#[derive(Debug, Clone)]
pub struct TurnUpdate {
    pub history: Vec<Message>,
    pub report: String,
    pub artifact: Option<PersonaBadge>,
    pub extra: Option<TurnMeta>,
}

impl TurnUpdate {
    /// 只有报告、没有历史的更新（如空输入）
    pub fn report_only(report: impl Into<String>) -> Self {
        Self {
            history: Vec::new(),
            report: report.into(),
            artifact: None,
            extra: None,
        }
    }

    /// 历史末尾的助手消息；末尾不是助手消息时为空串
    pub fn latest_assistant_reply(&self) -> String {
        match self.history.last() {
            Some(m) if m.role == Role::Assistant => m.content.clone(),
            _ => String::new(),
        }
    }
}

/// 一轮对话的输入
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_input: String,
    /// 客户端自带的历史；None 时使用会话内保存的对话
    pub history: Option<Vec<Message>>,
    /// 平稳情绪下的采样温度
    pub tone: f32,
    pub persona_override: Option<String>,
    pub session_id: Option<String>,
}

impl TurnRequest {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            history: None,
            tone: 0.6,
            persona_override: None,
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona_override = Some(persona.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_tone(mut self, tone: f32) -> Self {
        self.tone = tone;
        self
    }
}

/// 惰性、有限的更新序列；Err 表示本轮生成失败
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnUpdate, AgentError>> + Send>>;

/// 轮次生成器
pub trait TurnGenerator: Send + Sync {
    fn generate(&self, request: TurnRequest) -> TurnStream;
}

enum Phase {
    Streaming {
        updates: TurnStream,
        last_reply: String,
        last_report: String,
    },
    Done,
}

/// 更新序列 → 客户端事件流（总以一条 is_final 事件结束）
pub fn stream_turn(updates: TurnStream) -> impl Stream<Item = StreamEvent> + Send {
    let start = Phase::Streaming {
        updates,
        last_reply: String::new(),
        last_report: STREAMING_REPORT.to_string(),
    };
    stream::unfold(start, |phase| async move {
        let Phase::Streaming {
            mut updates,
            last_reply,
            last_report,
        } = phase
        else {
            return None;
        };
        match updates.next().await {
            Some(Ok(update)) => {
                let reply = update.latest_assistant_reply();
                let event = StreamEvent::partial(reply.clone(), update.report.clone());
                let next = Phase::Streaming {
                    updates,
                    last_reply: reply,
                    last_report: update.report,
                };
                Some((event, next))
            }
            Some(Err(e)) => {
                tracing::error!("turn generation failed: {}", e);
                Some((StreamEvent::failure(e.to_string()), Phase::Done))
            }
            None => Some((StreamEvent::finished(last_reply, last_report), Phase::Done)),
        }
    })
}

/// 驱动生成器并转换为事件流
pub fn run_turn(generator: &dyn TurnGenerator, request: TurnRequest) -> impl Stream<Item = StreamEvent> + Send {
    stream_turn(generator.generate(request))
}
