//! 共享对话历史
//!
//! 由环境节点维护并随观测广播；只追加，追加后不重排、不修改。

use serde::{Deserialize, Serialize};

/// 单条对话
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub sender_name: String,
    pub text: String,
    pub timestamp: String,
}

impl ChatTurn {
    /// 以本地时间（%Y-%m-%d %H:%M:%S）打时间戳
    pub fn now(sender_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_name: sender_name.into(),
            text: text.into(),
            timestamp: formatted_local_time(),
        }
    }
}

pub fn formatted_local_time() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// 只追加的对话历史
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl From<Vec<ChatTurn>> for ChatHistory {
    fn from(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }
}
