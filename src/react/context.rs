//! 上下文文本化：对话历史、观测、动作历史、动作空间、任务示例 → prompt 片段

use serde_json::Value;

use crate::bus::{ActionDescription, TaskExample};
use crate::memory::ChatTurn;

pub fn chat_history_to_str(self_name: &str, chat_history: &[ChatTurn]) -> String {
    if chat_history.is_empty() {
        return "(no messages yet)".to_string();
    }
    chat_history
        .iter()
        .map(|turn| {
            let sender = if turn.sender_name == self_name {
                format!("You ({})", self_name)
            } else {
                turn.sender_name.clone()
            };
            format!("[{}] {}: {}", turn.timestamp, sender, turn.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 对象按键逐段展开，字符串值原样输出；其它类型输出紧凑 JSON
pub fn observation_to_str(observation: &Value) -> String {
    match observation {
        Value::Object(map) if !map.is_empty() => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}:\n{}", k, s),
                other => format!("{}:\n{}", k, other),
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        Value::Null => "(no observation)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn action_history_to_str(action_history: &[String]) -> String {
    if action_history.is_empty() {
        return "(no action taken yet)".to_string();
    }
    action_history
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {}", i + 1, a))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 渲染动作空间，跳过 excluded 中的动作（协作动作由计划阶段单独处理）
pub fn action_space_to_str(action_space: &[ActionDescription], excluded: &[&str]) -> String {
    action_space
        .iter()
        .filter(|a| !excluded.contains(&a.name.as_str()))
        .map(|a| format!("- {}: {}", a.name, a.usage))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn task_example_to_str(example: &TaskExample) -> String {
    let mut s = format!("Here is an example of how to solve a task.\nTask: {}\n", example.question);
    for (i, step) in example.trajectory.iter().enumerate() {
        s.push_str(&format!("Step {}: {}\n", i + 1, step));
    }
    s.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_marks_self() {
        let chat = vec![
            ChatTurn {
                sender_name: "agent".into(),
                text: "hi".into(),
                timestamp: "t1".into(),
            },
            ChatTurn {
                sender_name: "alice".into(),
                text: "hello".into(),
                timestamp: "t2".into(),
            },
        ];
        assert_eq!(
            chat_history_to_str("agent", &chat),
            "[t1] You (agent): hi\n[t2] alice: hello"
        );
        assert_eq!(chat_history_to_str("agent", &[]), "(no messages yet)");
    }

    #[test]
    fn test_observation_object() {
        let obs = json!({"editor": "draft text", "step": 3});
        assert_eq!(observation_to_str(&obs), "editor:\ndraft text\n\nstep:\n3");
        assert_eq!(observation_to_str(&Value::Null), "(no observation)");
    }

    #[test]
    fn test_action_space_excludes_collaboration() {
        let space = vec![
            ActionDescription::new("send_teammate_message", "SendTeammateMessage(message=...)"),
            ActionDescription::new("search", "SEARCH(query=...)"),
            ActionDescription::new("wait_teammate_continue", "WaitTeammateContinue()"),
        ];
        assert_eq!(
            action_space_to_str(&space, &["send_teammate_message", "wait_teammate_continue"]),
            "- search: SEARCH(query=...)"
        );
    }

    #[test]
    fn test_action_history_numbered() {
        assert_eq!(
            action_history_to_str(&["A()".into(), "B()".into()]),
            "1. A()\n2. B()"
        );
    }

    #[test]
    fn test_task_example() {
        let ex = TaskExample {
            question: "Q".into(),
            trajectory: vec!["A()".into(), "B()".into()],
        };
        assert_eq!(
            task_example_to_str(&ex),
            "Here is an example of how to solve a task.\nTask: Q\nStep 1: A()\nStep 2: B()"
        );
    }
}
