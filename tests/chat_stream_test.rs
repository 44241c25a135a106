//! 流式对话集成测试：脚本化 LLM + 确定性嵌入，驱动两轮完整对话

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tempfile::TempDir;

use emoai::core::{run_turn, StreamEvent, TurnRequest};
use emoai::llm::ScriptedLlmClient;
use emoai::persona::{ReplyLength, EMPATHETIC, META_MARKER};
use emoai::EmotionalAgent;

const SESSION: &str = "it-session";

/// 收尾在终止事件之后异步进行；以会话历史写回为完成标志
async fn wait_for_turns(agent: &EmotionalAgent, turns: usize) {
    for _ in 0..200 {
        if let Some(session) = agent.sessions().get(SESSION).await {
            if session.lock().await.conversation.len() >= turns * 2 {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("turn {} did not finish", turns);
}

async fn turn(agent: &EmotionalAgent, input: &str) -> Vec<StreamEvent> {
    let request = TurnRequest::new(input)
        .with_session(SESSION)
        .with_persona(EMPATHETIC);
    run_turn(agent, request).collect().await
}

#[tokio::test]
async fn test_two_turns_with_retrieval_and_meta_feedback() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlmClient::with_script(
        vec![
            // 第一轮：分类、回复、反思
            Ok(r#"```json
{"label": "sadness", "score": 0.9}
```"#
                .into()),
            Ok("That sounds heavy. Rest is okay.".into()),
            Ok("Gentle validation helped.".into()),
            // 第二轮（Meta）：偏好解释、分类、回复、改进句
            Ok(r#"{"reply_length": "short"}"#.into()),
            Ok(r#"{"label": "neutral", "score": 0.8}"#.into()),
            Ok("Got it.".into()),
            Ok("i should keep answers brief. And warm.".into()),
        ],
        Ok("unused".into()),
    ));
    let agent = EmotionalAgent::builder(llm.clone())
        .with_emotion_log_path(dir.path().join("logs/emotion_log.jsonl"))
        .with_index_dir(dir.path().join("indexes"))
        .with_seed(7)
        .build();
    let indexed = agent
        .retriever()
        .index_documents(
            "empathy_agent",
            &["Resting is a form of self care.".to_string()],
            1000,
            100,
        )
        .await
        .unwrap();
    assert_eq!(indexed, 1);

    // 第一轮
    let events = turn(&agent, "I feel a bit tired today").await;
    let last = events.last().unwrap();
    assert!(last.is_final);
    assert_eq!(last.reply_chunk, "That sounds heavy. Rest is okay.");
    assert!(last.report.contains("**Emotion:** sadness (0.90)"));
    assert!(last.report.contains("<span style='color:#FFB6C1'>empathetic</span>"));
    assert!(last.report.ends_with("**Avg Valence:** -0.80"));
    assert!(events[..events.len() - 1].iter().all(|e| !e.is_final));
    wait_for_turns(&agent, 1).await;

    let requests = llm.requests();
    let system = &requests[1].messages[0].content;
    assert!(system.contains("[Retrieved Context]\nResting is a form of self care."));
    assert_eq!(requests[1].max_tokens, Some(512));

    // 第二轮：Meta 反馈，偏好改为 short
    let events = turn(&agent, "Could the replies be shorter").await;
    let last = events.last().unwrap();
    assert_eq!(last.reply_chunk, "Got it.");
    assert!(last.report.contains("**Emotion:** neutral (0.80)"));
    assert!(last.report.contains("**Trend:** stable"));
    assert!(last.report.ends_with("**Avg Valence:** -0.78"));
    wait_for_turns(&agent, 2).await;

    assert_eq!(agent.state().preferences().reply_length, ReplyLength::Short);
    let requests = llm.requests();
    assert_eq!(requests.len(), 7);
    let reply_request = &requests[5];
    assert_eq!(reply_request.max_tokens, Some(200));
    // system + 上一轮 user/assistant + 本轮 user
    assert_eq!(reply_request.messages.len(), 4);

    assert_eq!(
        agent.state().feedback.all(EMPATHETIC),
        vec![
            "Gentle validation helped.".to_string(),
            format!("{}I should keep answers brief.", META_MARKER),
        ]
    );

    let entries = agent.emotion_log().read_all();
    assert_eq!(entries.len(), 2);
    // Meta 轮沿用上一轮的情绪标签
    assert_eq!(entries[1].emotion.as_deref(), Some("sadness"));
    assert_eq!(entries[1].agent_used.as_deref(), Some(EMPATHETIC));
    assert_eq!(entries[1].ai_reply.as_deref(), Some("Got it."));
    assert_eq!(entries[1].extra["session_id"], SESSION);
    assert!(entries.iter().all(|e| e.timestamp.is_some()));
}

#[tokio::test]
async fn test_sessions_do_not_share_history() {
    let dir = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedLlmClient::replying("Hello there."));
    let agent = EmotionalAgent::builder(llm.clone())
        .with_emotion_log_path(dir.path().join("emotion_log.jsonl"))
        .with_index_dir(dir.path().join("indexes"))
        .with_seed(1)
        .build();

    let a: Vec<StreamEvent> = run_turn(&agent, TurnRequest::new("good morning").with_session("a"))
        .collect()
        .await;
    assert_eq!(a.last().unwrap().reply_chunk, "Hello there.");

    let b: Vec<StreamEvent> = run_turn(&agent, TurnRequest::new("good evening").with_session("b"))
        .collect()
        .await;
    assert!(b.last().unwrap().error.is_none());

    // 会话 b 的回复请求只有 system + user
    let reply_request = llm
        .requests()
        .into_iter()
        .rev()
        .find(|r| {
            r.messages[0].content.starts_with("[Global User Persona Settings]")
                && r.messages.last().is_some_and(|m| m.content == "good evening")
        })
        .unwrap();
    assert_eq!(reply_request.messages.len(), 2);
}
