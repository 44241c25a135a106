//! 意图识别：按关键词（整词匹配）粗分 fun / help / ask / chat

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Fun,
    Help,
    Ask,
    Chat,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Fun => "fun",
            Intent::Help => "help",
            Intent::Ask => "ask",
            Intent::Chat => "chat",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const FUN_WORDS: &[&str] = &["joke", "funny", "laugh", "story", "meme", "pun"];

const HELP_WORDS: &[&str] = &[
    "help", "advise", "problem", "issue", "cheated", "betray", "betrayed", "divorce", "grief",
    "depress", "depressed", "anxious", "panic", "lonely",
];

const ASK_WORDS: &[&str] = &["why", "how", "what", "when", "where", "which", "who"];

/// 小写后按非单词字符切分，再以单空格拼接并在两端补空格，便于整词 / 整短语查找
fn word_line(text: &str) -> String {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    format!(" {} ", words.join(" "))
}

/// text 中是否出现任一整词或整短语（短语内以单空格分隔）
pub fn contains_any_word(text: &str, words: &[&str]) -> bool {
    let line = word_line(text);
    words
        .iter()
        .any(|w| line.contains(&format!(" {} ", w)))
}

/// 依次检查 fun、help、疑问词，都不命中为 chat
pub fn detect_intent(text: &str) -> Intent {
    if contains_any_word(text, FUN_WORDS) {
        Intent::Fun
    } else if contains_any_word(text, HELP_WORDS) {
        Intent::Help
    } else if contains_any_word(text, ASK_WORDS) {
        Intent::Ask
    } else {
        Intent::Chat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_intent() {
        assert_eq!(detect_intent("Tell me a JOKE!"), Intent::Fun);
        assert_eq!(detect_intent("I was betrayed by my friend"), Intent::Help);
        assert_eq!(detect_intent("why is the sky blue"), Intent::Ask);
        assert_eq!(detect_intent("nice weather today"), Intent::Chat);
    }

    #[test]
    fn test_fun_checked_before_help() {
        assert_eq!(detect_intent("help me find a funny meme"), Intent::Fun);
    }

    #[test]
    fn test_whole_words_only() {
        // helpful / showhow 不是整词
        assert_eq!(detect_intent("that was helpful"), Intent::Chat);
        assert_eq!(detect_intent("showhow"), Intent::Chat);
        assert!(contains_any_word("this is too long, honestly", &["too long"]));
        assert!(!contains_any_word("toolong", &["too long"]));
    }
}
