//! 情绪日志统计与每日报告
//!
//! 按本地日期（时间戳的 `YYYY-MM-DD` 前缀）统计当天与前一天的情绪分布，再请 LLM 写一份分节的日报。

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::llm::{CompletionRequest, LlmClient};
use crate::memory::EmotionLogEntry;

const UNKNOWN_EMOTION: &str = "unknown";
const REPORT_TEMPERATURE: f32 = 0.6;
const REPORT_MAX_TOKENS: u32 = 420;
pub const NO_REPORT: &str = "No report generated.";
const NO_YESTERDAY: &str =
    "No emotion data is available for yesterday; please analyze today's data only.";

/// 新的在前；没有时间戳的排在最后
pub fn sort_newest_first(mut entries: Vec<EmotionLogEntry>) -> Vec<EmotionLogEntry> {
    entries.sort_by_key(|e| Reverse(e.timestamp.clone()));
    entries
}

/// 某天的情绪计数
pub fn count_emotions_on(entries: &[EmotionLogEntry], day: NaiveDate) -> BTreeMap<String, usize> {
    let prefix = day.format("%Y-%m-%d").to_string();
    let mut counts = BTreeMap::new();
    for entry in entries {
        let on_day = entry
            .timestamp
            .as_deref()
            .is_some_and(|ts| ts.starts_with(&prefix));
        if on_day {
            let emotion = entry.emotion.as_deref().unwrap_or(UNKNOWN_EMOTION);
            *counts.entry(emotion.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// 当天与前一天的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: String,
    pub total_entries: usize,
    pub emotion_counts: BTreeMap<String, usize>,
    pub yesterday_counts: BTreeMap<String, usize>,
}

pub fn daily_stats(entries: &[EmotionLogEntry], today: NaiveDate) -> DailyStats {
    let emotion_counts = count_emotions_on(entries, today);
    let yesterday_counts = count_emotions_on(entries, today - Duration::days(1));
    DailyStats {
        date: today.format("%Y-%m-%d").to_string(),
        total_entries: emotion_counts.values().sum(),
        emotion_counts,
        yesterday_counts,
    }
}

fn join_counts(counts: &BTreeMap<String, usize>) -> String {
    counts
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 与前一天的对比说明；前一天没有数据时提示只分析今天
pub fn compare_with_yesterday(stats: &DailyStats) -> String {
    if stats.yesterday_counts.is_empty() {
        return NO_YESTERDAY.to_string();
    }
    let mut keys: Vec<&String> = stats
        .emotion_counts
        .keys()
        .chain(stats.yesterday_counts.keys())
        .collect();
    keys.sort();
    keys.dedup();
    let changes = keys
        .into_iter()
        .map(|k| {
            let today = stats.emotion_counts.get(k).copied().unwrap_or(0) as i64;
            let yesterday = stats.yesterday_counts.get(k).copied().unwrap_or(0) as i64;
            let delta = today - yesterday;
            if delta >= 0 {
                format!("{} +{}", k, delta)
            } else {
                format!("{} {}", k, delta)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Yesterday's emotion counts: {}\nChange summary: {}",
        join_counts(&stats.yesterday_counts),
        changes
    )
}

/// 日报提示词
pub fn build_report_prompt(stats: &DailyStats) -> String {
    let summary = if stats.emotion_counts.is_empty() {
        "no data".to_string()
    } else {
        join_counts(&stats.emotion_counts)
    };
    format!(
        "Today is {date}.\n\
         Today's emotion counts: {summary}\n\
         {compare}\n\n\
         Write a short daily emotional report for the user using exactly these sections:\n\
         1. Today's Mood Keywords\n\
         2. Emotion Trend\n\
         3. Emotional Summary\n\
         4. AI Observation\n\
         5. Healing Exercise\n\
         6. AI's Message\n\n\
         Tone: warm, supportive, and non-judgmental.\n\
         Write in English.\n\
         Keep each section under 3 sentences.",
        date = stats.date,
        summary = summary,
        compare = compare_with_yesterday(stats),
    )
}

/// 每日报告：统计 + LLM 文本
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    #[serde(flatten)]
    pub stats: DailyStats,
    pub ai_daily_report: String,
}

/// 生成日报；LLM 失败时报告文本为 `[Error generating report: ...]`，统计照常返回
pub async fn generate_daily_report(
    llm: &Arc<dyn LlmClient>,
    entries: &[EmotionLogEntry],
    today: NaiveDate,
) -> DailyReport {
    let stats = daily_stats(entries, today);
    let request = CompletionRequest::user(build_report_prompt(&stats))
        .with_temperature(REPORT_TEMPERATURE)
        .with_max_tokens(REPORT_MAX_TOKENS);
    let ai_daily_report = match llm.complete(&request).await {
        Ok(text) if text.trim().is_empty() => NO_REPORT.to_string(),
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            tracing::error!(date = %stats.date, "daily report failed: {}", e);
            format!("[Error generating report: {}]", e)
        }
    };
    DailyReport {
        stats,
        ai_daily_report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};

    fn entry(ts: &str, emotion: Option<&str>) -> EmotionLogEntry {
        EmotionLogEntry {
            timestamp: Some(ts.to_string()),
            emotion: emotion.map(str::to_string),
            ..Default::default()
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sample() -> Vec<EmotionLogEntry> {
        vec![
            entry("2025-03-02T09:00:00.000+08:00", Some("joy")),
            entry("2025-03-02T10:00:00.000+08:00", Some("joy")),
            entry("2025-03-02T11:00:00.000+08:00", None),
            entry("2025-03-01T22:00:00.000+08:00", Some("sadness")),
            entry("2025-02-27T22:00:00.000+08:00", Some("anger")),
        ]
    }

    #[test]
    fn test_daily_stats() {
        let stats = daily_stats(&sample(), day("2025-03-02"));
        assert_eq!(stats.date, "2025-03-02");
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.emotion_counts.get("joy"), Some(&2));
        assert_eq!(stats.emotion_counts.get("unknown"), Some(&1));
        assert_eq!(stats.yesterday_counts.len(), 1);
        assert_eq!(stats.yesterday_counts.get("sadness"), Some(&1));
    }

    #[test]
    fn test_compare_with_yesterday() {
        let stats = daily_stats(&sample(), day("2025-03-02"));
        let text = compare_with_yesterday(&stats);
        assert!(text.starts_with("Yesterday's emotion counts: sadness: 1\n"));
        assert!(text.contains("joy +2"));
        assert!(text.contains("sadness -1"));

        let empty = daily_stats(&sample(), day("2025-03-05"));
        assert_eq!(compare_with_yesterday(&empty), NO_YESTERDAY);
        assert!(build_report_prompt(&empty).contains("Today's emotion counts: no data"));
    }

    #[test]
    fn test_sort_newest_first() {
        let mut entries = sample();
        entries.push(EmotionLogEntry::with_emotion("joy"));
        let sorted = sort_newest_first(entries);
        assert_eq!(
            sorted[0].timestamp.as_deref(),
            Some("2025-03-02T11:00:00.000+08:00")
        );
        assert!(sorted.last().unwrap().timestamp.is_none());
    }

    #[tokio::test]
    async fn test_generate_daily_report() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::replying("  A calm day.  "));
        let report = generate_daily_report(&llm, &sample(), day("2025-03-02")).await;
        assert_eq!(report.ai_daily_report, "A calm day.");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_entries"], 3);
        assert_eq!(json["emotion_counts"]["joy"], 2);

        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::replying("   "));
        let report = generate_daily_report(&llm, &sample(), day("2025-03-02")).await;
        assert_eq!(report.ai_daily_report, NO_REPORT);

        let llm: Arc<dyn LlmClient> =
            Arc::new(ScriptedLlmClient::failing(LlmError::Api("down".into())));
        let report = generate_daily_report(&llm, &sample(), day("2025-03-02")).await;
        assert!(report.ai_daily_report.starts_with("[Error generating report:"));
        assert_eq!(report.stats.total_entries, 3);
    }
}
