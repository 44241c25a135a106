//! 人格注册表
//!
//! 内置三个人格：empathetic、counselor、funny。启动时可由配置追加或覆盖，运行期只读。

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

pub const EMPATHETIC: &str = "empathetic";
pub const COUNSELOR: &str = "counselor";
pub const FUNNY: &str = "funny";

/// 一个人格：身份、目标、语气与禁忌，外加前端徽标颜色与检索索引名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub role: String,
    pub objective: String,
    pub tone: String,
    pub avoid: String,
    #[serde(default = "default_color")]
    pub color: String,
    /// 为 None 时该人格不做检索
    #[serde(default)]
    pub retrieval_index: Option<String>,
}

fn default_color() -> String {
    "#FFB6C1".to_string()
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        objective: impl Into<String>,
        tone: impl Into<String>,
        avoid: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            objective: objective.into(),
            tone: tone.into(),
            avoid: avoid.into(),
            color: default_color(),
            retrieval_index: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_retrieval_index(mut self, index: impl Into<String>) -> Self {
        self.retrieval_index = Some(index.into());
        self
    }
}

/// 有序注册表（保持注册顺序，同名注册覆盖原位置）
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PersonaRegistry {
    pub fn empty() -> Self {
        Self {
            personas: Vec::new(),
        }
    }

    /// 内置三人格
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        reg.register(
            Persona::new(
                EMPATHETIC,
                "kind listener",
                "reply with gentle understanding and short, natural sentences",
                "soft and conversational",
                "therapy clichés or exaggerated sympathy",
            )
            .with_color("#FFB6C1")
            .with_retrieval_index("empathy_agent"),
        );
        reg.register(
            Persona::new(
                COUNSELOR,
                "empathetic listener",
                "listen closely and reflect feelings back without judging or fixing",
                "warm, calm, and genuine",
                "giving advice or framing emotions as problems to solve",
            )
            .with_color("#ADD8E6")
            .with_retrieval_index("counsel_agent"),
        );
        reg.register(
            Persona::new(
                FUNNY,
                "friendly mood-lifter",
                "add brief, harmless humor that fits the moment",
                "light and spontaneous",
                "personal teasing or heavy sarcasm",
            )
            .with_color("#FFD580"),
        );
        reg
    }

    /// 追加人格；同名则替换
    pub fn register(&mut self, persona: Persona) {
        match self.personas.iter_mut().find(|p| p.name == persona.name) {
            Some(existing) => *existing = persona,
            None => self.personas.push(persona),
        }
    }

    pub fn get(&self, name: &str) -> Result<&Persona, AgentError> {
        self.personas
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| AgentError::UnknownPersona(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.personas.iter().any(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.personas.iter().map(|p| p.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}
