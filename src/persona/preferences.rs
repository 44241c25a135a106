//! 用户风格偏好
//!
//! 全局一份，由 Meta 反馈解释结果更新，每轮构建提示词时读取。
//! 各字段都有 `unchanged` 取值：提示词构建器据此判断是否输出 [User Preference Override]。

use std::fmt;

use serde::{Deserialize, Serialize};

pub const UNCHANGED: &str = "unchanged";

const SHORT_REPLY_TOKENS: u32 = 200;
const DEFAULT_REPLY_TOKENS: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyLength {
    Short,
    Medium,
    Long,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Positivity {
    Balanced,
    Increase,
    Decrease,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmpathyLevel {
    High,
    Increase,
    Decrease,
    Unchanged,
}

impl ReplyLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
            Self::Unchanged => UNCHANGED,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "short" => Some(Self::Short),
            "medium" => Some(Self::Medium),
            "long" => Some(Self::Long),
            UNCHANGED => Some(Self::Unchanged),
            _ => None,
        }
    }
}

impl Positivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Unchanged => UNCHANGED,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "balanced" => Some(Self::Balanced),
            "increase" => Some(Self::Increase),
            "decrease" => Some(Self::Decrease),
            UNCHANGED => Some(Self::Unchanged),
            _ => None,
        }
    }
}

impl EmpathyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Unchanged => UNCHANGED,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "increase" => Some(Self::Increase),
            "decrease" => Some(Self::Decrease),
            UNCHANGED => Some(Self::Unchanged),
            _ => None,
        }
    }
}

impl fmt::Display for ReplyLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Positivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for EmpathyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Meta 反馈解释器给出的调整项；未提及的字段为 None
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreferenceInterpretation {
    pub reply_length: Option<String>,
    pub tone: Option<String>,
    pub positivity: Option<String>,
    #[serde(alias = "empathy")]
    pub empathy_level: Option<String>,
}

impl PreferenceInterpretation {
    pub fn is_empty(&self) -> bool {
        self.reply_length.is_none()
            && self.tone.is_none()
            && self.positivity.is_none()
            && self.empathy_level.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceState {
    pub tone: String,
    pub reply_length: ReplyLength,
    pub positivity: Positivity,
    pub empathy_level: EmpathyLevel,
}

impl Default for PreferenceState {
    fn default() -> Self {
        Self {
            tone: "neutral and gentle".to_string(),
            reply_length: ReplyLength::Medium,
            positivity: Positivity::Balanced,
            empathy_level: EmpathyLevel::High,
        }
    }
}

impl PreferenceState {
    /// 只覆盖解释结果中出现且可识别的字段
    pub fn apply(&mut self, interpretation: &PreferenceInterpretation) {
        if let Some(v) = interpretation.reply_length.as_deref() {
            match ReplyLength::parse(v) {
                Some(len) => self.reply_length = len,
                None => tracing::debug!("ignoring unknown reply_length: {}", v),
            }
        }
        if let Some(v) = interpretation.tone.as_deref().map(str::trim) {
            if !v.is_empty() {
                self.tone = v.to_string();
            }
        }
        if let Some(v) = interpretation.positivity.as_deref() {
            match Positivity::parse(v) {
                Some(p) => self.positivity = p,
                None => tracing::debug!("ignoring unknown positivity: {}", v),
            }
        }
        if let Some(v) = interpretation.empathy_level.as_deref() {
            match EmpathyLevel::parse(v) {
                Some(e) => self.empathy_level = e,
                None => tracing::debug!("ignoring unknown empathy level: {}", v),
            }
        }
    }

    /// 回复 token 上限：偏好短回复时 200，否则 512
    pub fn max_reply_tokens(&self) -> u32 {
        if self.reply_length == ReplyLength::Short {
            SHORT_REPLY_TOKENS
        } else {
            DEFAULT_REPLY_TOKENS
        }
    }

    /// tone / 长度 / 积极度 中是否有任一项不是 unchanged
    pub fn has_override(&self) -> bool {
        self.tone != UNCHANGED
            || self.reply_length != ReplyLength::Unchanged
            || self.positivity != Positivity::Unchanged
    }
}
