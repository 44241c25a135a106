//! 情绪感知：分类、意图、平滑融合与趋势、Meta 反馈识别

pub mod classifier;
pub mod fusion;
pub mod intent;
pub mod meta;

pub use classifier::{valence_of, EmotionReading, LlmEmotionClassifier, VALENCE_TABLE};
pub use fusion::{
    average_valence, global_tone_and_temperature, stable_emotion_fusion, trend, EmotionRecord,
    Trend,
};
pub use intent::{detect_intent, Intent};
pub use meta::{detect_meta_feedback, interpret_feedback, try_interpret_feedback, MetaSignal};
