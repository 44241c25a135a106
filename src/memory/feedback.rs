//! 人格反馈记忆：每个人格一段有界的反思队列（最新在尾部）
//!
//! 追加时超过窗口即丢弃最旧条目；提示词只取最近几条。进程内共享，不做持久化。

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// 提示词中展示的反思条数
pub const PROMPT_FEEDBACK_COUNT: usize = 3;

#[derive(Debug)]
pub struct FeedbackMemory {
    entries: RwLock<HashMap<String, VecDeque<String>>>,
    window: usize,
}

impl Default for FeedbackMemory {
    fn default() -> Self {
        Self::new(20)
    }
}

impl FeedbackMemory {
    /// window 为每个人格保留的条数上限（至少为 1）
    pub fn new(window: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn push(&self, persona: &str, reflection: impl Into<String>) {
        let mut map = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let queue = map.entry(persona.to_string()).or_default();
        queue.push_back(reflection.into());
        while queue.len() > self.window {
            queue.pop_front();
        }
    }

    /// 最近 n 条，按时间顺序（旧在前）
    pub fn recent(&self, persona: &str, n: usize) -> Vec<String> {
        let map = self.entries.read().unwrap_or_else(|e| e.into_inner());
        map.get(persona)
            .map(|q| q.iter().skip(q.len().saturating_sub(n)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn all(&self, persona: &str) -> Vec<String> {
        self.recent(persona, usize::MAX)
    }

    pub fn len(&self, persona: &str) -> usize {
        let map = self.entries.read().unwrap_or_else(|e| e.into_inner());
        map.get(persona).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, persona: &str) -> bool {
        self.len(persona) == 0
    }
}
