//! Agent 成员循环
//!
//! 收到 TaskStart 调用 start；收到观测后等待 wait_time 合并更新的观测，再跑一个回合并发布动作。
//! 回合失败记录日志并以等待代替。退出前总是写入结果文件。

use std::sync::Arc;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusEvent, MessageBus};
use crate::memory::ChatTurn;
use crate::node::{tick_interval, ExitReason, MemberOptions};
use crate::react::{Action, CollaborativeAgent};

enum TurnOutcome {
    Acted,
    Skipped,
    Cancelled,
}

pub struct AgentMember {
    options: MemberOptions,
    agent: CollaborativeAgent,
    bus: Arc<dyn MessageBus>,
    steps: usize,
}

impl AgentMember {
    pub fn new(options: MemberOptions, agent: CollaborativeAgent, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            options,
            agent,
            bus,
            steps: 0,
        }
    }

    /// 运行到会话结束 / 步数用尽 / 空闲超时 / 关闭信号，然后落盘
    pub async fn run(mut self, shutdown: CancellationToken) -> anyhow::Result<ExitReason> {
        let reason = self.event_loop(&shutdown).await;
        let reason = match reason {
            Ok(reason) => reason,
            Err(e) => {
                tracing::error!(member = %self.options.name, error = %e, "member loop failed");
                self.persist();
                return Err(e);
            }
        };
        tracing::info!(member = %self.options.name, ?reason, steps = self.steps, "member exiting");
        self.persist();
        Ok(reason)
    }

    fn persist(&self) {
        if let Err(e) = self.agent.end(&self.options.result_dir, &self.options.name) {
            tracing::error!(member = %self.options.name, error = %e, "failed to write member artifacts");
        }
    }

    async fn event_loop(&mut self, shutdown: &CancellationToken) -> anyhow::Result<ExitReason> {
        let mut sub = self.bus.subscribe(&self.options.session_id).await?;
        let mut ticker = tick_interval(self.options.wait_time);
        let mut latest: Option<(Value, Vec<ChatTurn>)> = None;
        let mut act_at: Option<Instant> = None;
        let mut last_event = Instant::now();

        tracing::info!(
            member = %self.options.name,
            session_id = %self.options.session_id,
            "member joined session"
        );

        loop {
            let idle_deadline = last_event + self.options.idle_timeout;
            let tick_enabled = self.options.add_tick && self.agent.is_started() && latest.is_some();

            let turn_due = tokio::select! {
                _ = shutdown.cancelled() => return Ok(ExitReason::Shutdown),
                _ = tokio::time::sleep_until(idle_deadline) => {
                    tracing::warn!(member = %self.options.name, "no bus activity, giving up");
                    return Ok(ExitReason::IdleTimeout);
                }
                msg = sub.recv() => {
                    let Some(msg) = msg else {
                        return Ok(ExitReason::BusClosed);
                    };
                    last_event = Instant::now();
                    match msg.event {
                        BusEvent::TaskStart(start) => {
                            self.agent.start(&self.options.name, &start);
                        }
                        BusEvent::Observation { observation, chat_history } => {
                            latest = Some((observation, chat_history));
                            if act_at.is_none() {
                                act_at = Some(Instant::now() + self.options.wait_time);
                            }
                        }
                        BusEvent::End { reason } => return Ok(ExitReason::Ended(reason)),
                        BusEvent::Action { .. } | BusEvent::HumanInput { .. } => {}
                    }
                    false
                }
                _ = sleep_until_opt(act_at) => {
                    act_at = None;
                    true
                }
                _ = ticker.tick(), if tick_enabled => true,
            };

            if !turn_due {
                continue;
            }
            let Some((observation, chat_history)) = latest.clone() else {
                continue;
            };
            match self.take_turn(&observation, &chat_history, shutdown).await {
                TurnOutcome::Cancelled => return Ok(ExitReason::Shutdown),
                TurnOutcome::Skipped => {}
                TurnOutcome::Acted => {
                    if self.options.step_limit_reached(self.steps) {
                        return Ok(ExitReason::MaxSteps);
                    }
                }
            }
        }
    }

    async fn take_turn(
        &mut self,
        observation: &Value,
        chat_history: &[ChatTurn],
        shutdown: &CancellationToken,
    ) -> TurnOutcome {
        if !self.agent.is_started() {
            tracing::debug!(member = %self.options.name, "observation before task start, skipping");
            return TurnOutcome::Skipped;
        }

        let result = tokio::select! {
            _ = shutdown.cancelled() => return TurnOutcome::Cancelled,
            result = self.agent.get_action(observation, chat_history) => result,
        };
        let action = result.unwrap_or_else(|e| {
            tracing::warn!(member = %self.options.name, error = %e, "turn failed, waiting instead");
            Action::Wait
        });

        let event = BusEvent::Action {
            sender: self.options.name.clone(),
            action: action.to_action_string(),
        };
        if let Err(e) = self.bus.publish(&self.options.session_id, event).await {
            tracing::error!(member = %self.options.name, error = %e, "failed to publish action");
        }
        self.steps += 1;
        TurnOutcome::Acted
    }
}

/// 未设定时间点时永远挂起
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::bus::{BusSubscription, InMemoryBus, TaskStart};
    use crate::llm::{LlmError, MockLlmClient, RecordingLlmClient};
    use crate::memory::MemberArtifacts;
    use crate::react::{AgentSettings, PromptTemplates};

    const SESSION: &str = "lit_survey_0";

    fn options(dir: &std::path::Path) -> MemberOptions {
        MemberOptions {
            name: "agent".into(),
            session_id: SESSION.into(),
            wait_time: Duration::ZERO,
            max_steps: 0,
            add_tick: false,
            idle_timeout: Duration::from_secs(10),
            result_dir: dir.to_path_buf(),
        }
    }

    fn agent(replies: Vec<Result<String, LlmError>>) -> (CollaborativeAgent, Arc<MockLlmClient>) {
        let mock = Arc::new(MockLlmClient::scripted(replies));
        let llm = Arc::new(RecordingLlmClient::new(mock.clone(), 5));
        (
            CollaborativeAgent::new(llm, &PromptTemplates::default(), AgentSettings::default()),
            mock,
        )
    }

    fn start_event() -> BusEvent {
        BusEvent::TaskStart(TaskStart {
            team_members: vec!["agent".into()],
            task_description: "Write a survey.".into(),
            action_space: vec![],
            example: None,
        })
    }

    fn observation(n: u64) -> BusEvent {
        BusEvent::Observation {
            observation: json!({ "n": n }),
            chat_history: vec![],
        }
    }

    async fn next_action(sub: &mut BusSubscription) -> String {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), sub.recv())
                .await
                .unwrap()
                .unwrap();
            if let BusEvent::Action { action, .. } = msg.event {
                return action;
            }
        }
    }

    #[tokio::test]
    async fn test_llm_failure_publishes_wait() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(InMemoryBus::new());
        let (agent, _) = agent(vec![Err(LlmError::Request("connection refused".into()))]);
        let mut sub = bus.subscribe(SESSION).await.unwrap();
        let mut opts = options(dir.path());
        opts.max_steps = 1;

        bus.publish(SESSION, start_event()).await.unwrap();
        bus.publish(SESSION, observation(1)).await.unwrap();
        let reason = AgentMember::new(opts, agent, bus.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reason, ExitReason::MaxSteps);
        assert_eq!(next_action(&mut sub).await, "WaitTeammateContinue()");
        assert!(MemberArtifacts::new(dir.path(), "agent").load_info().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_time_coalesces_observations() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(InMemoryBus::new());
        let (agent, mock) = agent(vec![]);
        let mut opts = options(dir.path());
        opts.wait_time = Duration::from_secs(5);
        opts.max_steps = 1;

        bus.publish(SESSION, start_event()).await.unwrap();
        bus.publish(SESSION, observation(1)).await.unwrap();
        bus.publish(SESSION, observation(2)).await.unwrap();
        let reason = AgentMember::new(opts, agent, bus.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reason, ExitReason::MaxSteps);
        // 一个回合：更新 + 计划（默认回复为等待），且看到的是最新观测
        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("n:\n2"));
    }

    #[tokio::test]
    async fn test_observation_before_start_is_ignored_until_start() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(InMemoryBus::new());
        let (agent, mock) = agent(vec![]);
        let mut opts = options(dir.path());
        opts.idle_timeout = Duration::from_millis(200);

        bus.publish(SESSION, observation(1)).await.unwrap();
        let reason = AgentMember::new(opts, agent, bus.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reason, ExitReason::IdleTimeout);
        assert_eq!(mock.call_count(), 0);
        assert!(MemberArtifacts::new(dir.path(), "agent").load_info().is_ok());
    }

    #[tokio::test]
    async fn test_end_event_stops_member() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(InMemoryBus::new());
        let (agent, _) = agent(vec![]);
        bus.publish(SESSION, start_event()).await.unwrap();
        bus.publish(SESSION, BusEvent::End { reason: "terminal".into() }).await.unwrap();
        let reason = AgentMember::new(options(dir.path()), agent, bus.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reason, ExitReason::Ended("terminal".into()));
    }

    #[tokio::test]
    async fn test_shutdown_persists_artifacts() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(InMemoryBus::new());
        let (agent, _) = agent(vec![]);
        let token = CancellationToken::new();
        token.cancel();
        let reason = AgentMember::new(options(dir.path()), agent, bus.clone())
            .run(token)
            .await
            .unwrap();
        assert_eq!(reason, ExitReason::Shutdown);
        assert!(MemberArtifacts::new(dir.path(), "agent").load_info().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_takes_extra_turns() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(InMemoryBus::new());
        let (agent, mock) = agent(vec![]);
        let mut opts = options(dir.path());
        opts.wait_time = Duration::from_secs(1);
        opts.add_tick = true;
        opts.max_steps = 3;
        opts.idle_timeout = Duration::from_secs(600);

        bus.publish(SESSION, start_event()).await.unwrap();
        bus.publish(SESSION, observation(1)).await.unwrap();
        let reason = AgentMember::new(opts, agent, bus.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reason, ExitReason::MaxSteps);
        assert_eq!(mock.call_count(), 6);
    }
}
