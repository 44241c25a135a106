//! 记忆层：短期对话、人格反馈记忆、情绪日志、检索索引

pub mod conversation;
pub mod emotion_log;
pub mod feedback;
pub mod rag;

pub use conversation::{ConversationMemory, Message, Role};
pub use emotion_log::{now_timestamp, EmotionLog, EmotionLogEntry, LenientRead};
pub use feedback::{FeedbackMemory, PROMPT_FEEDBACK_COUNT};
pub use rag::{RetrievalIndex, Retriever};
