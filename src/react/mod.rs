//! 回合决策：输出解析与清洗、prompt 模板、上下文文本化、协作 Agent 状态机

pub mod action;
pub mod context;
pub mod decision;
pub mod parser;
pub mod prompts;

pub use action::{Action, COLLABORATION_ACTS, SEND_TEAMMATE_MESSAGE, WAIT_TEAMMATE_CONTINUE};
pub use decision::{AgentSettings, CollaborativeAgent, DecisionFailure};
pub use parser::{
    classify_plan, parse_act, parse_message, parse_plan, parse_update, sanitize_action,
    ParseError, PlanDecision,
};
pub use prompts::{ComposedPrompts, PromptTemplates};
