//! 回合动作：任务动作 / 协作消息 / 等待
//!
//! 协作动作在总线上以函数调用字符串传输：`SendTeammateMessage(message="...")`、`WaitTeammateContinue()`。

use serde::{Deserialize, Serialize};

pub const SEND_TEAMMATE_MESSAGE: &str = "send_teammate_message";
pub const WAIT_TEAMMATE_CONTINUE: &str = "wait_teammate_continue";
/// 渲染任务说明时要排除的协作动作
pub const COLLABORATION_ACTS: [&str; 2] = [SEND_TEAMMATE_MESSAGE, WAIT_TEAMMATE_CONTINUE];

const SEND_CALL_PREFIX: &str = "SendTeammateMessage(message=";
const WAIT_CALL: &str = "WaitTeammateContinue()";

/// 每回合每个 Agent 恰好产出一个 Action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    TaskAction { raw: String },
    CollaborativeMessage { text: String },
    Wait,
}

impl Action {
    /// 发布到总线上的动作字符串
    pub fn to_action_string(&self) -> String {
        match self {
            Action::TaskAction { raw } => raw.clone(),
            Action::CollaborativeMessage { text } => {
                // serde_json 负责引号与换行转义
                let quoted = serde_json::Value::String(text.clone()).to_string();
                format!("{}{})", SEND_CALL_PREFIX, quoted)
            }
            Action::Wait => WAIT_CALL.to_string(),
        }
    }

    /// 从动作字符串还原（环境节点用）；非协作动作一律视为任务动作
    pub fn from_action_string(s: &str) -> Self {
        let s = s.trim();
        if s == WAIT_CALL {
            return Action::Wait;
        }
        if let Some(body) = s.strip_prefix(SEND_CALL_PREFIX).and_then(|b| b.strip_suffix(')')) {
            if let Ok(text) = serde_json::from_str::<String>(body) {
                return Action::CollaborativeMessage { text };
            }
        }
        Action::TaskAction { raw: s.to_string() }
    }

    pub fn is_wait(&self) -> bool {
        matches!(self, Action::Wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_string_escapes() {
        let a = Action::CollaborativeMessage {
            text: "Book \"Hotel A\"?\nThanks".into(),
        };
        let s = a.to_action_string();
        assert_eq!(s, r#"SendTeammateMessage(message="Book \"Hotel A\"?\nThanks")"#);
        assert_eq!(Action::from_action_string(&s), a);
    }

    #[test]
    fn test_wait_and_task() {
        assert_eq!(Action::Wait.to_action_string(), "WaitTeammateContinue()");
        assert_eq!(Action::from_action_string(" WaitTeammateContinue() "), Action::Wait);
        assert_eq!(
            Action::from_action_string("SEARCH(q=\"x\")"),
            Action::TaskAction {
                raw: "SEARCH(q=\"x\")".into()
            }
        );
    }
}
