//! 人类代理成员
//!
//! 前端通过总线发送 `HumanInput { member, action }`。每个观测到达后最多等待 wait_time：
//! 期间有输入则转发，否则代发一次等待。不调用 LLM，结果文件的模型名记为 `human`。

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::{BusEvent, MessageBus};
use crate::llm::TokenCounts;
use crate::memory::{MemberArtifacts, MemberInfo};
use crate::node::member::sleep_until_opt;
use crate::node::{ExitReason, MemberOptions};
use crate::react::Action;

pub const HUMAN_LM: &str = "human";

pub struct HumanMember {
    options: MemberOptions,
    bus: Arc<dyn MessageBus>,
    steps: usize,
}

impl HumanMember {
    pub fn new(options: MemberOptions, bus: Arc<dyn MessageBus>) -> Self {
        Self { options, bus, steps: 0 }
    }

    pub async fn run(mut self, shutdown: CancellationToken) -> anyhow::Result<ExitReason> {
        let result = self.event_loop(&shutdown).await;
        if let Ok(reason) = &result {
            tracing::info!(member = %self.options.name, ?reason, steps = self.steps, "human member exiting");
        }
        self.persist();
        result
    }

    fn persist(&self) {
        let info = MemberInfo {
            lm: HUMAN_LM.to_string(),
            token_usage: TokenCounts::default(),
        };
        if let Err(e) = MemberArtifacts::new(&self.options.result_dir, &self.options.name).save(&info, &[], &[]) {
            tracing::error!(member = %self.options.name, error = %e, "failed to write member artifacts");
        }
    }

    async fn send(&mut self, action: String) {
        let event = BusEvent::Action {
            sender: self.options.name.clone(),
            action,
        };
        if let Err(e) = self.bus.publish(&self.options.session_id, event).await {
            tracing::error!(member = %self.options.name, error = %e, "failed to publish action");
        }
        self.steps += 1;
    }

    async fn event_loop(&mut self, shutdown: &CancellationToken) -> anyhow::Result<ExitReason> {
        let mut sub = self.bus.subscribe(&self.options.session_id).await?;
        let mut inputs: VecDeque<String> = VecDeque::new();
        let mut waiting_until: Option<Instant> = None;
        let mut last_event = Instant::now();

        loop {
            let idle_deadline = last_event + self.options.idle_timeout;
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(ExitReason::Shutdown),
                _ = tokio::time::sleep_until(idle_deadline) => return Ok(ExitReason::IdleTimeout),
                msg = sub.recv() => {
                    let Some(msg) = msg else {
                        return Ok(ExitReason::BusClosed);
                    };
                    last_event = Instant::now();
                    match msg.event {
                        BusEvent::HumanInput { member, action } if member == self.options.name => {
                            inputs.push_back(action);
                        }
                        BusEvent::Observation { .. } => {
                            if waiting_until.is_none() {
                                waiting_until = Some(Instant::now() + self.options.wait_time);
                            }
                        }
                        BusEvent::End { reason } => return Ok(ExitReason::Ended(reason)),
                        _ => continue,
                    }
                    // 有观测在等且已有输入：立即转发
                    if waiting_until.is_some() {
                        if let Some(action) = inputs.pop_front() {
                            waiting_until = None;
                            tracing::info!(member = %self.options.name, action = %action, "Human action");
                            self.send(action).await;
                        }
                    }
                }
                _ = sleep_until_opt(waiting_until) => {
                    waiting_until = None;
                    tracing::debug!(member = %self.options.name, "no human input in time, waiting");
                    self.send(Action::Wait.to_action_string()).await;
                }
            }

            if self.options.step_limit_reached(self.steps) {
                return Ok(ExitReason::MaxSteps);
            }
        }
    }
}
