//! Prompt 模板：内置默认 + 目录覆盖
//!
//! 每段模板可由 `[agent].prompt_dir` 下同名 .txt 覆盖；按模式拼接成 update / plan / message / act 四种 prompt。
//! 占位符形如 `{name}`，单趟替换，插入值中的花括号不会被再次展开。

use std::path::Path;

const SYSTEM: &str = "You are {name}, a member of a team with {team_members}. \
Your team is working on the following task:\n{task_description}\n\n\
Your scratchpad:\n{scratchpad}\n\n\
Chat history with your teammates:\n{chat_history}\n\n\
Current observation of the shared environment:\n{observation}";

const ACTION_HISTORY: &str = "Actions you have taken so far:\n{action_history}";

const PLAN_NEXT_STEP: &str = "Decide what to do next. Options:\n\
1. Send a message to your teammates (ask a question, share progress, propose a plan).\n\
2. Take a task action in the environment.\n\
3. Do nothing and wait for your teammates.\n\
Reason first, then answer with \"Plan: <option number>\".";

const PLAN_NEXT_STEP_DEMO: &str = "Example:\n\
Thought: My teammate asked me a question I have not answered yet.\n\
Plan: 1";

const TAKE_NEXT_TASK_ACTION: &str = "You decided to take a task action. Available actions:\n\
{action_space_description}\n\n\
Reason first, then give exactly one action as a function call after \"Action:\".";

const SEND_MESSAGE: &str = "You decided to send a message to your teammates. \
Reason first, then write the message after \"Message:\".";

const UPDATE_SCRATCHPAD: &str = "Before acting, update your scratchpad with anything worth remembering \
(task progress, teammate preferences, open questions).\n\
Scratchpad actions:\n{scratchpad_action_space_description}\n\n\
Reason first, then give the scratchpad action after \"Action:\".";

pub const OUTPUT_START: &str = "Now give your output starting with \"Thought:\".";

/// 原始模板片段
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub system: String,
    pub action_history: String,
    pub plan_next_step: String,
    pub plan_next_step_demo: String,
    pub take_next_task_action: String,
    pub send_message: String,
    pub update_scratchpad: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system: SYSTEM.to_string(),
            action_history: ACTION_HISTORY.to_string(),
            plan_next_step: PLAN_NEXT_STEP.to_string(),
            plan_next_step_demo: PLAN_NEXT_STEP_DEMO.to_string(),
            take_next_task_action: TAKE_NEXT_TASK_ACTION.to_string(),
            send_message: SEND_MESSAGE.to_string(),
            update_scratchpad: UPDATE_SCRATCHPAD.to_string(),
        }
    }
}

impl PromptTemplates {
    /// 从目录加载覆盖；缺失的文件沿用内置模板
    pub fn load(dir: Option<&Path>) -> Self {
        let mut t = Self::default();
        let Some(dir) = dir else {
            return t;
        };
        let slots: [(&str, &mut String); 7] = [
            ("system.txt", &mut t.system),
            ("action_history.txt", &mut t.action_history),
            ("plan_next_step.txt", &mut t.plan_next_step),
            ("plan_next_step_demo.txt", &mut t.plan_next_step_demo),
            ("take_next_task_action.txt", &mut t.take_next_task_action),
            ("send_message.txt", &mut t.send_message),
            ("update_scratchpad.txt", &mut t.update_scratchpad),
        ];
        for (file, slot) in slots {
            if let Ok(text) = std::fs::read_to_string(dir.join(file)) {
                tracing::debug!(file, "prompt template overridden");
                *slot = text;
            }
        }
        t
    }
}

/// 拼接好的四种 prompt 模板
#[derive(Debug, Clone)]
pub struct ComposedPrompts {
    pub update: String,
    pub plan: String,
    pub message: String,
    pub act: String,
}

impl ComposedPrompts {
    pub fn compose(t: &PromptTemplates, add_plan_demo: bool) -> Self {
        let mut plan = vec![t.system.as_str(), t.action_history.as_str(), t.plan_next_step.as_str()];
        if add_plan_demo {
            plan.push(t.plan_next_step_demo.as_str());
        }
        plan.push(OUTPUT_START);

        Self {
            update: [t.system.as_str(), t.update_scratchpad.as_str()].join("\n\n"),
            plan: plan.join("\n\n"),
            message: [t.system.as_str(), t.send_message.as_str()].join("\n\n"),
            act: [
                t.system.as_str(),
                t.action_history.as_str(),
                t.take_next_task_action.as_str(),
            ]
            .join("\n\n"),
        }
    }

    /// 追加任务示例（start 时已知示例后调用）
    pub fn append_task_demo(&mut self, demo: &str) {
        self.act = [self.act.as_str(), demo, OUTPUT_START].join("\n\n");
    }
}

/// 单趟替换 `{key}`；未知占位符原样保留
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match vars.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_single_pass() {
        let out = render("Hi {name}, obs: {observation}", &[("name", "A"), ("observation", "{name}")]);
        assert_eq!(out, "Hi A, obs: {name}");
    }

    #[test]
    fn test_render_keeps_unknown_and_unclosed() {
        assert_eq!(render("{x} and {", &[]), "{x} and {");
        assert_eq!(render("json {\"a\": 1}", &[]), "json {\"a\": 1}");
    }

    #[test]
    fn test_compose_plan_demo_toggle() {
        let t = PromptTemplates::default();
        let with = ComposedPrompts::compose(&t, true);
        let without = ComposedPrompts::compose(&t, false);
        assert!(with.plan.contains("Plan: 1"));
        assert!(!without.plan.contains("Example:"));
        assert!(with.plan.ends_with(OUTPUT_START));
        assert!(!with.act.contains(OUTPUT_START));
    }

    #[test]
    fn test_append_task_demo() {
        let mut p = ComposedPrompts::compose(&PromptTemplates::default(), false);
        p.append_task_demo("Example task: ...");
        assert!(p.act.contains("Example task: ..."));
        assert!(p.act.ends_with(OUTPUT_START));
    }

    #[test]
    fn test_load_override() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("send_message.txt"), "Say hi after Message:").unwrap();
        let t = PromptTemplates::load(Some(dir.path()));
        assert_eq!(t.send_message, "Say hi after Message:");
        assert_eq!(t.system, SYSTEM);
    }
}
