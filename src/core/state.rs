//! 运行期状态：按会话隔离的对话与情绪历史，以及所有会话共享的人格状态
//!
//! 会话状态由 SessionStore 按 session_id 懒创建；偏好、分数、反馈记忆放在 AgentState 中显式传递。

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, RwLock as AsyncRwLock};

use crate::emotion::EmotionRecord;
use crate::memory::{ConversationMemory, FeedbackMemory};
use crate::persona::{AgentScores, PersonaRegistry, PreferenceInterpretation, PreferenceState};

/// 单个会话：对话历史 + 情绪历史
#[derive(Debug, Clone)]
pub struct SessionState {
    pub conversation: ConversationMemory,
    pub emotion_history: Vec<EmotionRecord>,
}

impl SessionState {
    pub fn new(max_turns: usize) -> Self {
        Self {
            conversation: ConversationMemory::new(max_turns),
            emotion_history: Vec::new(),
        }
    }

    /// 上一轮（倒数第二条）的效价；本轮记录已入历史后调用
    pub fn previous_valence(&self) -> Option<f64> {
        let n = self.emotion_history.len();
        (n >= 2).then(|| self.emotion_history[n - 2].valence)
    }
}

/// 会话表：session_id → 会话状态
#[derive(Debug)]
pub struct SessionStore {
    sessions: AsyncRwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
    max_turns: usize,
}

impl SessionStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: AsyncRwLock::new(HashMap::new()),
            max_turns,
        }
    }

    /// 取会话，不存在则创建
    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        if let Some(s) = self.sessions.read().await.get(session_id) {
            return Arc::clone(s);
        }
        let mut map = self.sessions.write().await;
        Arc::clone(
            map.entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(self.max_turns)))),
        )
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }
}

/// 所有会话共享的人格状态：偏好、人格分数、反馈记忆
#[derive(Debug)]
pub struct AgentState {
    pub preferences: RwLock<PreferenceState>,
    pub scores: RwLock<AgentScores>,
    pub feedback: Arc<FeedbackMemory>,
}

impl AgentState {
    /// 每个已注册人格以相同初始分数起步
    pub fn new(registry: &PersonaRegistry, initial_score: f64, feedback_window: usize) -> Self {
        Self {
            preferences: RwLock::new(PreferenceState::default()),
            scores: RwLock::new(AgentScores::uniform(registry.names(), initial_score)),
            feedback: Arc::new(FeedbackMemory::new(feedback_window)),
        }
    }

    pub fn preferences(&self) -> PreferenceState {
        self.preferences
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn apply_preferences(&self, interpretation: &PreferenceInterpretation) {
        self.preferences
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .apply(interpretation);
    }

    pub fn scores(&self) -> AgentScores {
        self.scores.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_score(&self, persona: &str, score: f64) {
        self.scores
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set(persona, score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::ReplyLength;

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new(10);
        let a = store.get_or_create("a").await;
        a.lock()
            .await
            .emotion_history
            .push(EmotionRecord::new("hi", "joy", 1.0));

        let b = store.get_or_create("b").await;
        assert!(b.lock().await.emotion_history.is_empty());

        let a_again = store.get_or_create("a").await;
        assert_eq!(a_again.lock().await.emotion_history.len(), 1);
        assert_eq!(store.ids().await, vec!["a", "b"]);
        assert!(store.remove("a").await);
        assert!(store.get("a").await.is_none());
    }

    #[test]
    fn test_previous_valence() {
        let mut s = SessionState::new(5);
        s.emotion_history.push(EmotionRecord::new("x", "joy", 0.4));
        assert_eq!(s.previous_valence(), None);
        s.emotion_history.push(EmotionRecord::new("y", "sadness", -0.2));
        assert_eq!(s.previous_valence(), Some(0.4));
    }

    #[test]
    fn test_agent_state_defaults() {
        let state = AgentState::new(&PersonaRegistry::builtin(), 20.0, 20);
        assert_eq!(state.scores().get("funny"), Some(20.0));
        assert_eq!(state.scores().len(), 3);
        state.apply_preferences(&PreferenceInterpretation {
            reply_length: Some("short".into()),
            ..Default::default()
        });
        assert_eq!(state.preferences().reply_length, ReplyLength::Short);
    }

    #[test]
    fn test_shared_state_under_concurrent_turns() {
        let state = Arc::new(AgentState::new(&PersonaRegistry::builtin(), 20.0, 10));
        let handles: Vec<_> = ["empathetic", "counselor", "funny"]
            .into_iter()
            .map(|persona| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        state.set_score(persona, i as f64);
                        state.feedback.push(persona, format!("r{}", i));
                        state.apply_preferences(&PreferenceInterpretation {
                            tone: Some(format!("tone {}", i)),
                            ..Default::default()
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let scores = state.scores();
        assert_eq!(scores.len(), 3);
        for persona in ["empathetic", "counselor", "funny"] {
            assert_eq!(scores.get(persona), Some(99.0));
            assert_eq!(state.feedback.len(persona), 10);
        }
        assert_eq!(state.preferences().tone, "tone 99");
    }
}
