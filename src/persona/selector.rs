//! 人格选择
//!
//! 先走两条硬规则（求助 / 强负面 → counselor，玩笑 → funny），否则在全部人格上按 softmax(分数 + 效价倾斜) 抽样。
//! 随机源由调用方注入，测试可用固定种子复现。

use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;

use crate::emotion::Intent;
use crate::persona::registry::{COUNSELOR, EMPATHETIC, FUNNY};

/// 触发 counselor 硬规则的负面情绪
pub const NEGATIVE_EMOTIONS: [&str; 8] = [
    "sadness",
    "fear",
    "anger",
    "disgust",
    "grief",
    "remorse",
    "disappointment",
    "nervousness",
];

const NEGATIVE_VALENCE_THRESHOLD: f64 = -0.6;
const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// 人格分数（logit），按名字有序
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentScores(BTreeMap<String, f64>);

impl AgentScores {
    pub fn uniform<I, S>(names: I, score: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(|n| (n.into(), score)).collect())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, score: f64) {
        self.0.insert(name.into(), score);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 一轮选择所需的情绪信号
#[derive(Debug, Clone)]
pub struct SelectionInput<'a> {
    pub emotion: &'a str,
    pub intent: Intent,
    pub valence: f64,
    pub confidence: f64,
    pub previous_valence: Option<f64>,
}

/// 数值稳定的 softmax（先减最大值）
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// 效价倾斜：非负偏 empathetic，负偏 counselor，≥0.2 再偏 funny
pub fn valence_tilt(persona: &str, valence: f64) -> f64 {
    match persona {
        EMPATHETIC if valence >= 0.0 => 0.10,
        COUNSELOR if valence < 0.0 => 0.10,
        FUNNY if valence >= 0.2 => 0.05,
        _ => 0.0,
    }
}

/// 倾斜后的抽样分布，顺序与 scores 一致
pub fn selection_probabilities(scores: &AgentScores, valence: f64) -> Vec<(String, f64)> {
    let logits: Vec<f64> = scores
        .iter()
        .map(|(name, score)| score + valence_tilt(name, valence))
        .collect();
    scores
        .iter()
        .map(|(name, _)| name.clone())
        .zip(softmax(&logits))
        .collect()
}

/// 硬规则命中时返回人格名
pub fn hard_rule(input: &SelectionInput<'_>) -> Option<&'static str> {
    let strongly_negative = NEGATIVE_EMOTIONS.iter().any(|e| *e == input.emotion)
        && input.valence < NEGATIVE_VALENCE_THRESHOLD
        && input.confidence > CONFIDENCE_THRESHOLD;
    if input.intent == Intent::Help || strongly_negative {
        Some(COUNSELOR)
    } else if input.intent == Intent::Fun {
        Some(FUNNY)
    } else {
        None
    }
}

/// 按累积概率取第一个超过 r 的名字；浮点误差导致未命中时取最后一个
fn weighted_choice(probs: &[(String, f64)], r: f64) -> Option<&str> {
    let mut cumulative = 0.0;
    for (name, p) in probs {
        cumulative += p;
        if r < cumulative {
            return Some(name);
        }
    }
    probs.last().map(|(name, _)| name.as_str())
}

/// 选出本轮人格
pub fn select<R: Rng + ?Sized>(
    input: &SelectionInput<'_>,
    scores: &AgentScores,
    rng: &mut R,
) -> String {
    if let Some(persona) = hard_rule(input) {
        tracing::debug!(persona, intent = ?input.intent, emotion = input.emotion, "persona chosen by rule");
        return persona.to_string();
    }

    let probs = selection_probabilities(scores, input.valence);
    let r: f64 = rng.gen();
    let chosen = weighted_choice(&probs, r).unwrap_or(EMPATHETIC).to_string();
    tracing::debug!(
        persona = %chosen,
        valence = input.valence,
        previous_valence = ?input.previous_valence,
        probabilities = ?probs,
        "persona sampled"
    );
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn input(emotion: &str, intent: Intent, valence: f64, confidence: f64) -> SelectionInput<'_> {
        SelectionInput {
            emotion,
            intent,
            valence,
            confidence,
            previous_valence: None,
        }
    }

    fn scores(e: f64, c: f64, f: f64) -> AgentScores {
        let mut s = AgentScores::default();
        s.set(EMPATHETIC, e);
        s.set(COUNSELOR, c);
        s.set(FUNNY, f);
        s
    }

    #[test]
    fn test_help_always_counselor() {
        let mut rng = StdRng::seed_from_u64(1);
        let skewed = scores(100.0, -100.0, 100.0);
        for _ in 0..50 {
            assert_eq!(select(&input("joy", Intent::Help, 0.9, 0.9), &skewed, &mut rng), COUNSELOR);
        }
    }

    #[test]
    fn test_fun_always_funny() {
        let mut rng = StdRng::seed_from_u64(2);
        let skewed = scores(100.0, 100.0, -100.0);
        for _ in 0..50 {
            assert_eq!(select(&input("neutral", Intent::Fun, 0.0, 0.9), &skewed, &mut rng), FUNNY);
        }
    }

    #[test]
    fn test_strong_negative_goes_to_counselor() {
        assert_eq!(hard_rule(&input("grief", Intent::Chat, -0.9, 0.8)), Some(COUNSELOR));
        // 任一条件不满足都不触发
        assert_eq!(hard_rule(&input("grief", Intent::Chat, -0.5, 0.8)), None);
        assert_eq!(hard_rule(&input("grief", Intent::Chat, -0.9, 0.7)), None);
        assert_eq!(hard_rule(&input("annoyance", Intent::Chat, -0.9, 0.9)), None);
        // 求助优先于玩笑
        assert_eq!(hard_rule(&input("sadness", Intent::Help, 0.0, 0.1)), Some(COUNSELOR));
    }

    #[test]
    fn test_softmax_uniform_then_tilted() {
        let uniform = softmax(&[0.0, 0.0, 0.0]);
        for p in &uniform {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }

        let probs = selection_probabilities(&scores(0.0, 0.0, 0.0), 0.0);
        let p = |name: &str| probs.iter().find(|(n, _)| n == name).unwrap().1;
        assert!(p(EMPATHETIC) > 1.0 / 3.0);
        assert!(p(EMPATHETIC) > p(COUNSELOR));
        assert!((p(COUNSELOR) - p(FUNNY)).abs() < 1e-12);
        assert!((probs.iter().map(|(_, p)| p).sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tilts_by_valence() {
        assert_eq!(valence_tilt(COUNSELOR, -0.1), 0.10);
        assert_eq!(valence_tilt(EMPATHETIC, -0.1), 0.0);
        assert_eq!(valence_tilt(FUNNY, 0.2), 0.05);
        assert_eq!(valence_tilt(FUNNY, 0.19), 0.0);
    }

    #[test]
    fn test_softmax_is_stable_for_large_logits() {
        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sampling_is_reproducible_with_seed() {
        let s = scores(20.0, 20.0, 20.0);
        let pick = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .map(|_| select(&input("neutral", Intent::Chat, 0.0, 0.9), &s, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(pick(7), pick(7));
    }

    #[test]
    fn test_dominant_score_wins() {
        let mut rng = StdRng::seed_from_u64(3);
        let s = scores(0.0, 0.0, 50.0);
        for _ in 0..20 {
            assert_eq!(select(&input("neutral", Intent::Chat, 0.0, 0.9), &s, &mut rng), FUNNY);
        }
    }
}
