//! 暂存区：每个 Agent 独占的自由文本笔记
//!
//! 每次 execute_action 整体覆盖（不合并、不回滚）；会话结束时写入 scratchpad.json。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 暂存区唯一识别的动作名；也接受不带包装的纯文本
pub const REWRITE_ACTION: &str = "REWRITE_NOTES";

fn rewrite_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)^\s*REWRITE_NOTES\s*\(\s*(?:notes\s*=\s*)?(.*?)\s*\)\s*$"#)
            .unwrap_or_else(|e| panic!("invalid scratchpad regex: {e}"))
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scratchpad {
    notes: Vec<String>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体覆盖：每行一条笔记，去掉列表前缀与空行
    pub fn update(&mut self, text: &str) {
        self.notes = text
            .lines()
            .map(|l| l.trim())
            .map(|l| l.strip_prefix("- ").unwrap_or(l).trim())
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
    }

    pub fn read(&self) -> String {
        self.notes.join("\n")
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// 执行模型给出的暂存区动作：`REWRITE_NOTES(...)` 或直接给出的笔记全文
    pub fn execute_action(&mut self, action: &str) {
        let payload = match rewrite_pattern().captures(action) {
            Some(caps) => {
                let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                strip_quotes(inner).to_string()
            }
            None => action.to_string(),
        };
        self.update(&payload);
        tracing::debug!(notes = self.notes.len(), "scratchpad rewritten");
    }

    /// 拼入 prompt 的文本
    pub fn to_prompt_str(&self) -> String {
        if self.notes.is_empty() {
            return "(empty)".to_string();
        }
        self.notes
            .iter()
            .map(|n| format!("- {}", n))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 动作词汇说明（渲染到更新 prompt）
    pub fn action_space_description() -> String {
        format!(
            "{}(notes=\"...\"): replace the whole scratchpad with the given notes, one note per line. \
             Anything not repeated is dropped. You may also write the new notes directly after \"Action:\".",
            REWRITE_ACTION
        )
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    for q in ["\"\"\"", "\"", "'"] {
        if s.len() >= 2 * q.len() && s.starts_with(q) && s.ends_with(q) {
            return &s[q.len()..s.len() - q.len()];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_overwrites() {
        let mut pad = Scratchpad::new();
        pad.update("- first\n- second");
        assert_eq!(pad.notes(), &["first".to_string(), "second".to_string()]);
        pad.update("third");
        assert_eq!(pad.read(), "third");
    }

    #[test]
    fn test_execute_wrapped_action() {
        let mut pad = Scratchpad::new();
        pad.execute_action("REWRITE_NOTES(notes=\"budget is $500\nhotel booked\")");
        assert_eq!(pad.read(), "budget is $500\nhotel booked");
    }

    #[test]
    fn test_execute_bare_text() {
        let mut pad = Scratchpad::new();
        pad.update("old");
        pad.execute_action("new fact");
        assert_eq!(pad.read(), "new fact");
    }

    #[test]
    fn test_empty_action_clears() {
        let mut pad = Scratchpad::new();
        pad.update("old");
        pad.execute_action("REWRITE_NOTES()");
        assert!(pad.notes().is_empty());
        assert_eq!(pad.to_prompt_str(), "(empty)");
    }

    #[test]
    fn test_serializes_as_notes() {
        let mut pad = Scratchpad::new();
        pad.update("a");
        let json = serde_json::to_string(&pad).unwrap();
        assert_eq!(json, r#"{"notes":["a"]}"#);
    }
}
