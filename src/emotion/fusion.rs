//! 情绪平滑与趋势
//!
//! 会话内每轮的（文本, 情绪, 效价）按时间追加到历史；新读数与上一条融合后再入历史，避免情绪标签来回跳。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 会话情绪历史中的一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionRecord {
    pub text: String,
    pub emotion: String,
    pub valence: f64,
}

impl EmotionRecord {
    pub fn new(text: impl Into<String>, emotion: impl Into<String>, valence: f64) -> Self {
        Self {
            text: text.into(),
            emotion: emotion.into(),
            valence,
        }
    }
}

const LOW_CONFIDENCE: f64 = 0.5;
const SUDDEN_SHIFT: f64 = 0.6;
const TREND_DEAD_BAND: f64 = 0.05;
const TONE_WINDOW: usize = 5;

/// 与上一条历史融合，返回（情绪, 效价）
///
/// 1. 无历史：原样返回
/// 2. 置信度 < 0.5：沿用上一条
/// 3. 效价变号且幅度 > 0.6：0.7 旧 + 0.3 新，标签取强度更大的一方
/// 4. Meta 模式：0.95 旧 + 0.05 新，沿用旧标签
/// 5. 其余：0.6 旧 + 0.4 新，用新标签
pub fn stable_emotion_fusion(
    emotion: &str,
    valence: f64,
    score: f64,
    history: &[EmotionRecord],
    meta_mode: bool,
) -> (String, f64) {
    let Some(prev) = history.last() else {
        return (emotion.to_string(), valence);
    };

    if score < LOW_CONFIDENCE {
        return (prev.emotion.clone(), prev.valence);
    }

    let sign_changed = (valence > 0.0 && prev.valence < 0.0) || (valence < 0.0 && prev.valence > 0.0);
    if sign_changed && (valence - prev.valence).abs() > SUDDEN_SHIFT {
        let fused = 0.7 * prev.valence + 0.3 * valence;
        let label = if prev.valence.abs() > valence.abs() {
            prev.emotion.clone()
        } else {
            emotion.to_string()
        };
        return (label, fused);
    }

    if meta_mode {
        return (prev.emotion.clone(), 0.95 * prev.valence + 0.05 * valence);
    }

    (emotion.to_string(), 0.6 * prev.valence + 0.4 * valence)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 最后两条的效价差；不足两条或差值在 ±0.05 内为 stable
pub fn trend(history: &[EmotionRecord]) -> Trend {
    match history {
        [.., prev, last] => {
            let diff = last.valence - prev.valence;
            if diff > TREND_DEAD_BAND {
                Trend::Up
            } else if diff < -TREND_DEAD_BAND {
                Trend::Down
            } else {
                Trend::Stable
            }
        }
        _ => Trend::Stable,
    }
}

/// 全部历史的平均效价；空历史为 0
pub fn average_valence(history: &[EmotionRecord]) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    history.iter().map(|r| r.valence).sum::<f64>() / history.len() as f64
}

/// 由最近 5 条平均效价决定语气提示与采样温度
///
/// > 0.5：cheerful and expressive / 0.9；< -0.5：calm and supportive / 0.5；否则 balanced / base_temperature。
pub fn global_tone_and_temperature(history: &[EmotionRecord], base_temperature: f32) -> (&'static str, f32) {
    let recent = &history[history.len().saturating_sub(TONE_WINDOW)..];
    let avg = average_valence(recent);
    if avg > 0.5 {
        ("cheerful and expressive", 0.9)
    } else if avg < -0.5 {
        ("calm and supportive", 0.5)
    } else {
        ("balanced", base_temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(vals: &[(&str, f64)]) -> Vec<EmotionRecord> {
        vals.iter()
            .map(|(e, v)| EmotionRecord::new("t", *e, *v))
            .collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_fusion_without_history() {
        assert_eq!(stable_emotion_fusion("joy", 1.0, 0.9, &[], false), ("joy".into(), 1.0));
    }

    #[test]
    fn test_low_confidence_inherits() {
        let h = hist(&[("sadness", -0.8)]);
        assert_eq!(stable_emotion_fusion("joy", 1.0, 0.3, &h, false), ("sadness".into(), -0.8));
    }

    #[test]
    fn test_sudden_sign_flip_damped() {
        let h = hist(&[("sadness", -0.8)]);
        let (label, v) = stable_emotion_fusion("joy", 1.0, 0.9, &h, false);
        assert_eq!(label, "joy");
        assert!(approx(v, 0.7 * -0.8 + 0.3 * 1.0));

        let h = hist(&[("anger", -1.0)]);
        let (label, _) = stable_emotion_fusion("approval", 0.5, 0.9, &h, false);
        assert_eq!(label, "anger");
    }

    #[test]
    fn test_meta_mode_holds_previous() {
        let h = hist(&[("joy", 0.6)]);
        let (label, v) = stable_emotion_fusion("neutral", 0.0, 0.9, &h, true);
        assert_eq!(label, "joy");
        assert!(approx(v, 0.57));
    }

    #[test]
    fn test_normal_smoothing() {
        let h = hist(&[("joy", 0.5)]);
        let (label, v) = stable_emotion_fusion("love", 0.9, 0.9, &h, false);
        assert_eq!(label, "love");
        assert!(approx(v, 0.66));
    }

    #[test]
    fn test_trend() {
        assert_eq!(trend(&hist(&[("joy", 0.5)])), Trend::Stable);
        assert_eq!(trend(&hist(&[("a", 0.0), ("b", 0.2)])), Trend::Up);
        assert_eq!(trend(&hist(&[("a", 0.0), ("b", -0.2)])), Trend::Down);
        assert_eq!(trend(&hist(&[("a", 0.0), ("b", 0.04)])), Trend::Stable);
    }

    #[test]
    fn test_tone_uses_last_five() {
        assert_eq!(global_tone_and_temperature(&[], 0.6), ("balanced", 0.6));
        let h = hist(&[
            ("x", -1.0),
            ("x", -1.0),
            ("joy", 0.8),
            ("joy", 0.8),
            ("joy", 0.8),
            ("joy", 0.8),
            ("joy", 0.8),
        ]);
        assert_eq!(global_tone_and_temperature(&h, 0.6), ("cheerful and expressive", 0.9));
        let sad = hist(&[("sadness", -0.8), ("grief", -0.9)]);
        assert_eq!(global_tone_and_temperature(&sad, 0.6), ("calm and supportive", 0.5));
        assert!(approx(average_valence(&sad), -0.85));
    }
}
