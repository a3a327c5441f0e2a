//! 总线协议：会话内广播的事件与信封

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::ChatTurn;

/// 动作空间中的一项：人类可读名 + 用法签名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescription {
    pub name: String,
    pub usage: String,
}

impl ActionDescription {
    pub fn new(name: impl Into<String>, usage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: usage.into(),
        }
    }
}

/// 任务示例：问题 + 轨迹（可选地拼入 act prompt）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskExample {
    pub question: String,
    pub trajectory: Vec<String>,
}

/// 任务开场信息，环境节点在会话开始时广播
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStart {
    pub team_members: Vec<String>,
    pub task_description: String,
    pub action_space: Vec<ActionDescription>,
    #[serde(default)]
    pub example: Option<TaskExample>,
}

/// 会话内事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    TaskStart(TaskStart),
    Observation {
        observation: serde_json::Value,
        chat_history: Vec<ChatTurn>,
    },
    Action {
        sender: String,
        action: String,
    },
    /// 人类前端提交的动作，由对应的人类代理成员转发
    HumanInput {
        member: String,
        action: String,
    },
    End {
        reason: String,
    },
}

/// 信封：id 用于订阅端去重（至少一次投递）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub id: Uuid,
    pub session_id: String,
    pub event: BusEvent,
}

impl BusMessage {
    pub fn new(session_id: impl Into<String>, event: BusEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let msg = BusMessage::new(
            "s",
            BusEvent::Action {
                sender: "a".into(),
                action: "Foo()".into(),
            },
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"]["type"], "action");
        assert_eq!(json["event"]["sender"], "a");
        let back: BusMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
