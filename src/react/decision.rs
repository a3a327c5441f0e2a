//! 回合决策状态机（每个 Agent 进程一个）
//!
//! 每次收到观测调用一次 get_action，严格按序：
//! 更新暂存区 → 计划（1 消息 / 2 任务动作 / 其它等待）→ 生成消息或任务动作 → 记入动作历史。
//! `&mut self` 保证同一 Agent 同时最多一个回合在进行，回合内 LLM 调用串行。
//!
//! 暂存区更新在第 1 步即生效；后续步骤失败时不回滚。

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::bus::TaskStart;
use crate::config::AgentSection;
use crate::llm::{CompletionRequest, LlmClient, LlmError, RecordingLlmClient};
use crate::memory::{ChatTurn, MemberArtifacts, MemberInfo, Scratchpad};
use crate::react::action::{Action, COLLABORATION_ACTS};
use crate::react::context::{
    action_history_to_str, action_space_to_str, chat_history_to_str, observation_to_str,
    task_example_to_str,
};
use crate::react::parser::{parse_act, parse_message, parse_plan, parse_update, PlanDecision};
use crate::react::prompts::{render, ComposedPrompts, PromptTemplates};

/// 回合决策失败：本回合的中间结果丢弃（已提交的暂存区更新除外）
#[derive(Error, Debug)]
pub enum DecisionFailure {
    #[error("agent has not been started")]
    NotStarted,

    #[error("LLM call failed during {stage}: {source}")]
    Llm {
        stage: &'static str,
        #[source]
        source: LlmError,
    },
}

/// 回合决策参数
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub update_max_tokens: u32,
    pub plan_max_tokens: u32,
    pub message_max_tokens: u32,
    pub act_max_tokens: u32,
    pub add_plan_demo: bool,
    pub add_task_demo: bool,
    /// 关闭协作时，计划为「发消息」也按任务动作执行
    pub disable_collaboration: bool,
}

impl AgentSettings {
    pub fn from_section(section: &AgentSection, disable_collaboration: bool) -> Self {
        Self {
            update_max_tokens: section.update_max_tokens,
            plan_max_tokens: section.plan_max_tokens,
            message_max_tokens: section.message_max_tokens,
            act_max_tokens: section.act_max_tokens,
            add_plan_demo: section.add_plan_demo,
            add_task_demo: section.add_task_demo,
            disable_collaboration,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_section(&AgentSection::default(), false)
    }
}

/// start 之后才确定的身份与任务信息
#[derive(Debug, Clone)]
struct TaskContext {
    name: String,
    team_members: String,
    task_description: String,
    task_action_space_description: String,
}

/// 带暂存区与情境计划的协作 Agent
pub struct CollaborativeAgent {
    llm: Arc<RecordingLlmClient>,
    settings: AgentSettings,
    prompts: ComposedPrompts,
    task: Option<TaskContext>,
    scratchpad: Scratchpad,
    action_history: Vec<String>,
}

impl CollaborativeAgent {
    pub fn new(llm: Arc<RecordingLlmClient>, templates: &PromptTemplates, settings: AgentSettings) -> Self {
        let prompts = ComposedPrompts::compose(templates, settings.add_plan_demo);
        Self {
            llm,
            settings,
            prompts,
            task: None,
            scratchpad: Scratchpad::new(),
            action_history: Vec::new(),
        }
    }

    /// 收到 TaskStart 时调用；重复调用会覆盖任务信息但保留暂存区与历史
    pub fn start(&mut self, name: &str, start: &TaskStart) {
        // 任务示例只在第一次 start 时拼入
        if self.task.is_none() && self.settings.add_task_demo {
            if let Some(example) = &start.example {
                self.prompts.append_task_demo(&task_example_to_str(example));
            }
        }
        self.task = Some(TaskContext {
            name: name.to_string(),
            team_members: start.team_members.join(", "),
            task_description: start.task_description.clone(),
            task_action_space_description: action_space_to_str(&start.action_space, &COLLABORATION_ACTS),
        });
        tracing::info!(agent = %name, team = ?start.team_members, "Agent started");
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    pub fn scratchpad(&self) -> &Scratchpad {
        &self.scratchpad
    }

    pub fn action_history(&self) -> &[String] {
        &self.action_history
    }

    async fn call(&self, stage: &'static str, prompt: String, max_tokens: u32) -> Result<String, DecisionFailure> {
        let request = CompletionRequest::deterministic(prompt, max_tokens);
        self.llm
            .complete(&request)
            .await
            .map_err(|source| DecisionFailure::Llm { stage, source })
    }

    /// 一个回合：观测 + 对话历史 → 恰好一个 Action
    pub async fn get_action(
        &mut self,
        observation: &Value,
        chat_history: &[ChatTurn],
    ) -> Result<Action, DecisionFailure> {
        let task = self.task.clone().ok_or(DecisionFailure::NotStarted)?;
        let chat = chat_history_to_str(&task.name, chat_history);
        let obs = observation_to_str(observation);

        // 1. 更新暂存区
        let scratchpad_actions = Scratchpad::action_space_description();
        let current_notes = self.scratchpad.to_prompt_str();
        let prompt = render(
            &self.prompts.update,
            &[
                ("name", task.name.as_str()),
                ("team_members", task.team_members.as_str()),
                ("task_description", task.task_description.as_str()),
                ("scratchpad", current_notes.as_str()),
                ("chat_history", chat.as_str()),
                ("observation", obs.as_str()),
                ("scratchpad_action_space_description", scratchpad_actions.as_str()),
            ],
        );
        let output = self.call("scratchpad update", prompt, self.settings.update_max_tokens).await?;
        self.scratchpad.execute_action(&parse_update(&output));

        // 2. 计划
        let scratchpad = self.scratchpad.to_prompt_str();
        let history = action_history_to_str(&self.action_history);
        let prompt = render(
            &self.prompts.plan,
            &[
                ("name", task.name.as_str()),
                ("team_members", task.team_members.as_str()),
                ("task_description", task.task_description.as_str()),
                ("scratchpad", scratchpad.as_str()),
                ("chat_history", chat.as_str()),
                ("observation", obs.as_str()),
                ("action_history", history.as_str()),
            ],
        );
        let output = self.call("plan", prompt, self.settings.plan_max_tokens).await?;
        let mut decision = parse_plan(&output);
        if decision == PlanDecision::Message && self.settings.disable_collaboration {
            tracing::debug!(agent = %task.name, "collaboration disabled, acting instead of messaging");
            decision = PlanDecision::Act;
        }
        tracing::debug!(agent = %task.name, ?decision, "plan decided");

        // 3-5. 按计划生成动作
        let action = match decision {
            PlanDecision::Message => {
                let prompt = render(
                    &self.prompts.message,
                    &[
                        ("name", task.name.as_str()),
                        ("team_members", task.team_members.as_str()),
                        ("task_description", task.task_description.as_str()),
                        ("scratchpad", scratchpad.as_str()),
                        ("chat_history", chat.as_str()),
                        ("observation", obs.as_str()),
                    ],
                );
                let output = self.call("message", prompt, self.settings.message_max_tokens).await?;
                match parse_message(&output) {
                    Ok(text) => Action::CollaborativeMessage { text },
                    Err(e) => {
                        tracing::warn!(agent = %task.name, error = %e, "unusable message, waiting instead");
                        Action::Wait
                    }
                }
            }
            PlanDecision::Act => {
                let prompt = render(
                    &self.prompts.act,
                    &[
                        ("name", task.name.as_str()),
                        ("team_members", task.team_members.as_str()),
                        ("task_description", task.task_description.as_str()),
                        ("action_space_description", task.task_action_space_description.as_str()),
                        ("scratchpad", scratchpad.as_str()),
                        ("chat_history", chat.as_str()),
                        ("observation", obs.as_str()),
                        ("action_history", history.as_str()),
                    ],
                );
                let output = self.call("act", prompt, self.settings.act_max_tokens).await?;
                match parse_act(&output) {
                    Ok(raw) => Action::TaskAction { raw },
                    Err(e) => {
                        tracing::warn!(agent = %task.name, error = %e, "unusable task action, waiting instead");
                        Action::Wait
                    }
                }
            }
            PlanDecision::Wait => Action::Wait,
        };

        let action_string = action.to_action_string();
        tracing::info!(agent = %task.name, action = %action_string, "Agent action");
        self.action_history.push(action_string);
        Ok(action)
    }

    /// 会话结束：写入 info.json / scratchpad.json / llm_call_history.jsonl
    pub fn end(&self, result_dir: &Path, name: &str) -> anyhow::Result<()> {
        let info = MemberInfo {
            lm: self.llm.model_name().to_string(),
            token_usage: self.llm.token_usage(),
        };
        MemberArtifacts::new(result_dir, name).save(&info, self.scratchpad.notes(), &self.llm.history())
    }
}
