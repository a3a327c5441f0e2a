//! 环境节点：把一个 `TaskEnvironment` 接到总线上
//!
//! 开场广播 TaskStart 和首个观测；之后每收到一个 Action：
//! 协作消息追加到对话历史，等待动作不改变环境，其余交给 `step`。
//! 环境进入终态或动作数达到上限时广播 End。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusError, BusEvent, MessageBus, TaskStart};
use crate::memory::{ChatHistory, ChatTurn};
use crate::react::Action;

/// 具体任务环境（检索、表格分析、旅行规划等）实现此 trait
pub trait TaskEnvironment: Send {
    fn task_start(&self) -> TaskStart;

    /// 重置并返回初始观测
    fn reset(&mut self) -> Value;

    /// 执行一个任务动作，返回新观测
    fn step(&mut self, sender: &str, action: &str) -> Value;

    fn is_terminal(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentOutcome {
    Terminal,
    MaxSteps,
    IdleTimeout,
    Shutdown,
}

impl EnvironmentOutcome {
    fn reason(&self) -> &'static str {
        match self {
            EnvironmentOutcome::Terminal => "task finished",
            EnvironmentOutcome::MaxSteps => "max steps reached",
            EnvironmentOutcome::IdleTimeout => "no team activity",
            EnvironmentOutcome::Shutdown => "shutdown",
        }
    }
}

pub struct EnvironmentNode<E: TaskEnvironment> {
    env: E,
    bus: Arc<dyn MessageBus>,
    session_id: String,
    max_steps: usize,
    idle_timeout: Duration,
    chat: ChatHistory,
    steps: usize,
}

impl<E: TaskEnvironment> EnvironmentNode<E> {
    pub fn new(env: E, bus: Arc<dyn MessageBus>, session_id: impl Into<String>, max_steps: usize) -> Self {
        Self {
            env,
            bus,
            session_id: session_id.into(),
            max_steps,
            idle_timeout: Duration::from_secs(600),
            chat: ChatHistory::new(),
            steps: 0,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn chat_history(&self) -> &ChatHistory {
        &self.chat
    }

    async fn publish_observation(&self, observation: &Value) -> Result<(), BusError> {
        let event = BusEvent::Observation {
            observation: observation.clone(),
            chat_history: self.chat.turns().to_vec(),
        };
        self.bus.publish(&self.session_id, event).await.map(|_| ())
    }

    /// 驱动一个会话直到结束，返回结束原因；任何结束路径都会广播 End
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<EnvironmentOutcome, BusError> {
        let mut sub = self.bus.subscribe(&self.session_id).await?;
        self.bus
            .publish(&self.session_id, BusEvent::TaskStart(self.env.task_start()))
            .await?;
        let mut observation = self.env.reset();
        self.publish_observation(&observation).await?;
        tracing::info!(session_id = %self.session_id, "environment started");

        let mut last_event = Instant::now();
        let outcome = loop {
            let idle_deadline = last_event + self.idle_timeout;
            let msg = tokio::select! {
                _ = shutdown.cancelled() => break EnvironmentOutcome::Shutdown,
                _ = tokio::time::sleep_until(idle_deadline) => break EnvironmentOutcome::IdleTimeout,
                msg = sub.recv() => msg,
            };
            let Some(msg) = msg else {
                break EnvironmentOutcome::Shutdown;
            };
            last_event = Instant::now();
            let BusEvent::Action { sender, action } = msg.event else {
                continue;
            };

            match Action::from_action_string(&action) {
                Action::CollaborativeMessage { text } => {
                    tracing::info!(session_id = %self.session_id, %sender, "teammate message");
                    self.chat.push(ChatTurn::now(sender, text));
                }
                Action::Wait => {}
                Action::TaskAction { raw } => {
                    tracing::info!(session_id = %self.session_id, %sender, action = %raw, "task action");
                    observation = self.env.step(&sender, &raw);
                }
            }
            self.steps += 1;

            if self.env.is_terminal() {
                break EnvironmentOutcome::Terminal;
            }
            if self.max_steps > 0 && self.steps >= self.max_steps {
                break EnvironmentOutcome::MaxSteps;
            }
            self.publish_observation(&observation).await?;
        };

        tracing::info!(session_id = %self.session_id, ?outcome, steps = self.steps, "environment finished");
        self.bus
            .publish(
                &self.session_id,
                BusEvent::End {
                    reason: outcome.reason().to_string(),
                },
            )
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::bus::InMemoryBus;

    const SESSION: &str = "travel_planning_3";

    #[derive(Default)]
    struct Notebook {
        lines: Vec<String>,
        finished: bool,
    }

    impl TaskEnvironment for Notebook {
        fn task_start(&self) -> TaskStart {
            TaskStart {
                team_members: vec!["agent".into(), "user".into()],
                task_description: "Draft an itinerary.".into(),
                action_space: vec![],
                example: None,
            }
        }

        fn reset(&mut self) -> Value {
            self.lines.clear();
            json!({"notebook": ""})
        }

        fn step(&mut self, _sender: &str, action: &str) -> Value {
            if action == "FINISH()" {
                self.finished = true;
            } else {
                self.lines.push(action.to_string());
            }
            json!({"notebook": self.lines.join("\n")})
        }

        fn is_terminal(&self) -> bool {
            self.finished
        }
    }

    async fn act(bus: &InMemoryBus, sender: &str, action: &str) {
        bus.publish(
            SESSION,
            BusEvent::Action {
                sender: sender.into(),
                action: action.into(),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_messages_go_to_chat_and_finish_ends() {
        let bus = Arc::new(InMemoryBus::new());
        let mut sub = bus.subscribe(SESSION).await.unwrap();
        act(&bus, "user", "SendTeammateMessage(message=\"Start with Paris\")").await;
        act(&bus, "agent", "WaitTeammateContinue()").await;
        act(&bus, "agent", "ADD(day=1)").await;
        act(&bus, "agent", "FINISH()").await;

        let node = EnvironmentNode::new(Notebook::default(), bus.clone(), SESSION, 30);
        let outcome = node.run(CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, EnvironmentOutcome::Terminal);

        let mut last_observation = None;
        let mut end = None;
        while let Some(msg) = sub.recv().await {
            match msg.event {
                BusEvent::Observation { observation, chat_history } => {
                    last_observation = Some((observation, chat_history));
                }
                BusEvent::End { reason } => {
                    end = Some(reason);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(end.as_deref(), Some("task finished"));
        let (observation, chat) = last_observation.unwrap();
        assert_eq!(observation, json!({"notebook": "ADD(day=1)"}));
        assert_eq!(chat.len(), 1);
        assert_eq!(chat[0].sender_name, "user");
        assert_eq!(chat[0].text, "Start with Paris");
    }

    #[tokio::test]
    async fn test_max_steps_counts_every_action() {
        let bus = Arc::new(InMemoryBus::new());
        act(&bus, "agent", "WaitTeammateContinue()").await;
        act(&bus, "agent", "WaitTeammateContinue()").await;

        let node = EnvironmentNode::new(Notebook::default(), bus.clone(), SESSION, 2);
        assert_eq!(
            node.run(CancellationToken::new()).await.unwrap(),
            EnvironmentOutcome::MaxSteps
        );
    }

    #[tokio::test]
    async fn test_shutdown_publishes_end() {
        let bus = Arc::new(InMemoryBus::new());
        let token = CancellationToken::new();
        token.cancel();
        let node = EnvironmentNode::new(Notebook::default(), bus.clone(), SESSION, 2)
            .with_idle_timeout(Duration::from_secs(1));
        assert_eq!(node.run(token).await.unwrap(), EnvironmentOutcome::Shutdown);
        // TaskStart + 首个观测 + End
        assert_eq!(bus.message_count(SESSION), 3);
    }
}
