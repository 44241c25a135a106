//! 文本清洗与分块
//!
//! 送往 LLM / 嵌入接口的文本都先经过 normalize：非 ASCII 连续段替换为单个空格，空白折叠，去首尾。
//! chunk 在清洗后的文本上按固定窗口切分，相邻块重叠 overlap 个字符，用于检索索引。

use serde_json::Value;

use crate::core::AgentError;

/// 默认块大小（字符）
pub const DEFAULT_MAX_CHARS: usize = 1000;
/// 默认重叠（字符）
pub const DEFAULT_OVERLAP: usize = 100;

/// 清洗文本：结果只含 ASCII，无连续空白，无首尾空白
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if !c.is_ascii() || c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// 任意 JSON 值先转成字符串再清洗（字符串取原文，其余取 JSON 表示）
pub fn normalize_value(value: &Value) -> String {
    match value {
        Value::String(s) => normalize(s),
        other => normalize(&other.to_string()),
    }
}

/// 过滤掉非字符串与全空白项后逐个清洗，保持顺序
pub fn normalize_batch(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(normalize)
        .collect()
}

/// 在清洗后的文本上切分重叠窗口
///
/// 每块 max_chars 个字符（末块可更短），起点每次前进 max_chars - overlap；
/// 末块到达文本末尾即停止。要求 0 < max_chars 且 overlap < max_chars。
pub fn chunk(text: &str, max_chars: usize, overlap: usize) -> Result<Vec<String>, AgentError> {
    if max_chars == 0 {
        return Err(AgentError::InvalidArgument(
            "max_chars must be greater than 0".to_string(),
        ));
    }
    if overlap >= max_chars {
        return Err(AgentError::InvalidArgument(format!(
            "overlap ({}) must be smaller than max_chars ({})",
            overlap, max_chars
        )));
    }

    // normalize 之后只剩 ASCII，按字节切片即按字符切片
    let text = normalize(text);
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let step = max_chars - overlap;
    let len = text.len();
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + max_chars).min(len);
        chunks.push(text[start..end].to_string());
        if end >= len {
            break;
        }
        start += step;
    }
    Ok(chunks)
}
