//! 情绪日志：追加写的 JSONL 文件
//!
//! 每轮对话写一行 JSON 记录，只追加、不改写；读取为全量扫描。
//! `try_*` 返回类型化错误；`append` / `read_all` 记录日志后吞掉错误，供不关心失败的调用方使用。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 一条情绪日志；已知字段之外的键保存在 extra 中原样写回
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_reply: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmotionLogEntry {
    /// 只带情绪标签的记录
    pub fn with_emotion(emotion: impl Into<String>) -> Self {
        Self {
            emotion: Some(emotion.into()),
            ..Default::default()
        }
    }
}

/// 宽松读取的结果：成功解析的记录与被跳过的坏行数
#[derive(Debug, Clone, Default)]
pub struct LenientRead {
    pub entries: Vec<EmotionLogEntry>,
    pub skipped: usize,
}

/// 当前本地时间的 ISO-8601 字符串（毫秒精度，带时区偏移）
pub fn now_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// 情绪日志存储：单文件，追加写由互斥锁串行化
#[derive(Debug)]
pub struct EmotionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl EmotionLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一条记录；缺少 timestamp 时补当前本地时间。父目录不存在时自动创建
    pub fn try_append(&self, mut entry: EmotionLogEntry) -> Result<(), AgentError> {
        if entry.timestamp.is_none() {
            entry.timestamp = Some(now_timestamp());
        }
        let mut line =
            serde_json::to_string(&entry).map_err(|e| AgentError::LogIo(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::LogIo(e.to_string()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AgentError::LogIo(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| AgentError::LogIo(e.to_string()))
    }

    /// 尽力追加：失败只记日志
    pub fn append(&self, entry: EmotionLogEntry) {
        if let Err(e) = self.try_append(entry) {
            tracing::error!(path = %self.path.display(), "emotion log write failed: {}", e);
        }
    }

    /// 全量读取；文件不存在视为空。任一非空行解析失败即整体报错
    pub fn try_read_all(&self) -> Result<Vec<EmotionLogEntry>, AgentError> {
        let Some(content) = self.read_content()? else {
            return Ok(Vec::new());
        };
        content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<EmotionLogEntry>(line)
                    .map_err(|e| AgentError::LogIo(format!("line {}: {}", i + 1, e)))
            })
            .collect()
    }

    /// 全量读取；任何错误（含单个坏行）都返回空列表并记日志
    pub fn read_all(&self) -> Vec<EmotionLogEntry> {
        match self.try_read_all() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(path = %self.path.display(), "emotion log read failed: {}", e);
                Vec::new()
            }
        }
    }

    /// 逐行读取，跳过坏行并统计条数
    pub fn read_all_lenient(&self) -> LenientRead {
        let content = match self.read_content() {
            Ok(Some(c)) => c,
            Ok(None) => return LenientRead::default(),
            Err(e) => {
                tracing::error!(path = %self.path.display(), "emotion log read failed: {}", e);
                return LenientRead::default();
            }
        };
        let mut result = LenientRead::default();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<EmotionLogEntry>(line) {
                Ok(entry) => result.entries.push(entry),
                Err(_) => result.skipped += 1,
            }
        }
        if result.skipped > 0 {
            tracing::warn!(
                path = %self.path.display(),
                skipped = result.skipped,
                "skipped malformed emotion log lines"
            );
        }
        result
    }

    fn read_content(&self) -> Result<Option<String>, AgentError> {
        match std::fs::read_to_string(&self.path) {
            Ok(c) => Ok(Some(c)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AgentError::LogIo(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_append_stamps_timestamp() {
        let dir = TempDir::new().unwrap();
        let log = EmotionLog::new(dir.path().join("logs/emotion_log.jsonl"));
        log.append(EmotionLogEntry::with_emotion("joy"));

        let entries = log.read_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].emotion.as_deref(), Some("joy"));
        let ts = entries[0].timestamp.as_deref().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_existing_timestamp_and_extra_fields_kept() {
        let dir = TempDir::new().unwrap();
        let log = EmotionLog::new(dir.path().join("e.jsonl"));
        let mut entry = EmotionLogEntry::with_emotion("sadness");
        entry.timestamp = Some("2024-01-02T03:04:05.000Z".into());
        entry.extra.insert("source".into(), Value::from("import"));
        log.try_append(entry.clone()).unwrap();

        assert_eq!(log.try_read_all().unwrap(), vec![entry]);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = EmotionLog::new(dir.path().join("absent.jsonl"));
        assert!(log.read_all().is_empty());
        assert_eq!(log.read_all_lenient().skipped, 0);
    }

    #[test]
    fn test_one_malformed_line_aborts_whole_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("e.jsonl");
        std::fs::write(
            &path,
            "{\"emotion\":\"joy\"}\nnot json\n\n{\"emotion\":\"anger\"}\n",
        )
        .unwrap();
        let log = EmotionLog::new(&path);

        assert!(log.read_all().is_empty());
        assert!(matches!(log.try_read_all(), Err(AgentError::LogIo(_))));

        let lenient = log.read_all_lenient();
        assert_eq!(lenient.entries.len(), 2);
        assert_eq!(lenient.skipped, 1);
    }

    #[test]
    fn test_error_reports_physical_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("e.jsonl");
        std::fs::write(&path, "\n\n{\"emotion\":\"joy\"}\nnot json\n").unwrap();
        let log = EmotionLog::new(&path);

        match log.try_read_all() {
            Err(AgentError::LogIo(msg)) => assert!(msg.starts_with("line 4:"), "{}", msg),
            other => panic!("expected LogIo, got {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(EmotionLog::new(dir.path().join("logs/emotion_log.jsonl")));
        // 大记录更容易暴露未加锁时的交错写入
        let reply = "x".repeat(20 * 1024);

        let handles: Vec<_> = (0..16)
            .map(|t| {
                let log = Arc::clone(&log);
                let reply = reply.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        let mut entry = EmotionLogEntry::with_emotion("joy");
                        entry.user_input = Some(format!("t{}-{}", t, i));
                        entry.ai_reply = Some(reply.clone());
                        log.try_append(entry).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let entries = log.try_read_all().unwrap();
        assert_eq!(entries.len(), 320);
        assert_eq!(log.read_all().len(), 320);
        assert_eq!(log.read_all_lenient().skipped, 0);
        assert!(entries
            .iter()
            .all(|e| e.ai_reply.as_deref().map(str::len) == Some(20 * 1024)));
    }

    #[test]
    fn test_write_failure_is_typed() {
        let dir = TempDir::new().unwrap();
        // 路径指向一个目录，打开文件必然失败
        let log = EmotionLog::new(dir.path());
        assert!(matches!(
            log.try_append(EmotionLogEntry::with_emotion("joy")),
            Err(AgentError::LogIo(_))
        ));
        log.append(EmotionLogEntry::with_emotion("joy"));
    }
}
