//! 核心层：错误类型、会话与人格状态、流式轮次编排

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{
    run_turn, stream_turn, PersonaBadge, StreamEvent, TurnGenerator, TurnMeta, TurnRequest,
    TurnStream, TurnUpdate,
};
pub use state::{AgentState, SessionState, SessionStore};
