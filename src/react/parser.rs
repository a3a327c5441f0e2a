//! 模型输出解析：每种 prompt 模式一个解析函数
//!
//! - update：`Action:` 之后的暂存区动作，缺失时取全文
//! - plan：`Plan:` 之后的计划，缺失时默认 "2"；含 1 → Message，否则含 2 → Act，否则 Wait
//! - message：`Message:` 之后的消息正文
//! - act：`Action:` 之后的任务动作，再经五道清洗
//!
//! 纯函数，除日志外无副作用。

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub const ACTION_MARKER: &str = "Action:";
pub const PLAN_MARKER: &str = "Plan:";
pub const MESSAGE_MARKER: &str = "Message:";
const THOUGHT_MARKER: &str = "\nThought:";
/// 没有 Plan: 标记时的默认计划（任务动作）
const DEFAULT_PLAN: &str = "2";

/// 回合计划
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanDecision {
    Message,
    Act,
    #[default]
    Wait,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty message after 'Message:'")]
    EmptyMessage,

    #[error("no task action left after sanitizing: {0:?}")]
    EmptyAction(String),
}

/// 取第一个 marker 之后的内容（trim）；没有 marker 返回 None
fn after_marker<'a>(raw: &'a str, marker: &str) -> Option<&'a str> {
    raw.find(marker).map(|idx| raw[idx + marker.len()..].trim())
}

pub fn parse_update(raw: &str) -> String {
    let raw = raw.trim();
    match after_marker(raw, ACTION_MARKER) {
        Some(payload) => payload.to_string(),
        None => {
            tracing::debug!("no '{}' in scratchpad update, using whole output", ACTION_MARKER);
            raw.to_string()
        }
    }
}

pub fn parse_plan(raw: &str) -> PlanDecision {
    let plan = after_marker(raw.trim(), PLAN_MARKER).unwrap_or(DEFAULT_PLAN);
    classify_plan(plan)
}

/// 字符包含判定：1 优先于 2，所以 "21" → Message
pub fn classify_plan(plan: &str) -> PlanDecision {
    if plan.contains('1') {
        PlanDecision::Message
    } else if plan.contains('2') {
        PlanDecision::Act
    } else {
        PlanDecision::Wait
    }
}

pub fn parse_message(raw: &str) -> Result<String, ParseError> {
    let raw = raw.trim();
    let message = after_marker(raw, MESSAGE_MARKER).unwrap_or_else(|| {
        tracing::debug!("no '{}' in message output, using whole output", MESSAGE_MARKER);
        raw
    });
    if message.is_empty() {
        return Err(ParseError::EmptyMessage);
    }
    Ok(message.to_string())
}

pub fn parse_act(raw: &str) -> Result<String, ParseError> {
    let raw = raw.trim();
    let action = after_marker(raw, ACTION_MARKER).unwrap_or(raw);
    let sanitized = sanitize_action(action);
    if sanitized.is_empty() {
        return Err(ParseError::EmptyAction(action.to_string()));
    }
    Ok(sanitized)
}

/// 五道清洗，顺序有意义：
/// a. 截掉 `\nThought:` 之后（模型在动作后继续推理）
/// b. 从第一个大写 ASCII 字母开始（动作是首字母大写的函数调用）
/// c. 不以 `)` 结尾时截到最后一个 `)`（含）
/// d. 还原被转义的 `\(` `\)` `\,`
/// e. 去掉 `print("` 后紧跟的换行（原始换行与 `\n` 两种），避免执行环境里的未闭合字符串
pub fn sanitize_action(action: &str) -> String {
    let mut action = action.trim();

    if let Some(idx) = action.find(THOUGHT_MARKER) {
        action = action[..idx].trim();
    }

    if let Some(idx) = action.find(|c: char| c.is_ascii_uppercase()) {
        action = &action[idx..];
    }

    if !action.ends_with(')') {
        if let Some(idx) = action.rfind(')') {
            action = &action[..=idx];
        }
    }

    let unescaped = action
        .replace("\\(", "(")
        .replace("\\)", ")")
        .replace("\\,", ",");
    print_newline_pattern()
        .replace_all(&unescaped, "print(\"")
        .into_owned()
}

/// `print("` 后连续的换行，原始与转义两种可混排
fn print_newline_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"print\("(?:\n|\\n)+"#)
            .unwrap_or_else(|e| panic!("invalid print newline regex: {e}"))
    })
}
