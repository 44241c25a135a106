//! 人格层：注册表、风格偏好、提示词构建、人格选择与反馈学习

pub mod feedback;
pub mod preferences;
pub mod prompt;
pub mod registry;
pub mod selector;

pub use feedback::{postprocess_meta, FeedbackLearner, FeedbackOutcome, META_MARKER};
pub use preferences::{
    EmpathyLevel, Positivity, PreferenceInterpretation, PreferenceState, ReplyLength,
};
pub use prompt::{build_global_persona, PromptBuilder};
pub use registry::{Persona, PersonaRegistry, COUNSELOR, EMPATHETIC, FUNNY};
pub use selector::{select, selection_probabilities, softmax, AgentScores, SelectionInput};
