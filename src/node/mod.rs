//! 会话节点：成员进程与环境节点的总线驱动循环
//!
//! - `member`：Agent 成员，观测 → 回合决策 → 发布动作
//! - `human`：人类代理成员，转发前端输入，超时发送等待
//! - `environment`：驱动 `TaskEnvironment`，广播任务与观测，判定结束

pub mod environment;
pub mod human;
pub mod member;

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

pub use environment::{EnvironmentNode, EnvironmentOutcome, TaskEnvironment};
pub use human::HumanMember;
pub use member::AgentMember;

/// 成员循环的公共参数
#[derive(Debug, Clone)]
pub struct MemberOptions {
    pub name: String,
    pub session_id: String,
    /// 收到观测后等待的时长，期间到达的新观测会覆盖旧的
    pub wait_time: Duration,
    /// 最多发布的动作数；0 表示不限
    pub max_steps: usize,
    /// 按 wait_time 周期在最近观测上额外行动
    pub add_tick: bool,
    /// 总线无消息超过该时长即退出
    pub idle_timeout: Duration,
    pub result_dir: PathBuf,
}

impl MemberOptions {
    pub(crate) fn step_limit_reached(&self, steps: usize) -> bool {
        self.max_steps > 0 && steps >= self.max_steps
    }
}

/// 成员循环退出原因；任一原因都会先落盘结果文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Ended(String),
    MaxSteps,
    IdleTimeout,
    Shutdown,
    BusClosed,
}

/// tick 周期；interval 不接受零周期
pub(crate) fn tick_interval(wait_time: Duration) -> tokio::time::Interval {
    let period = wait_time.max(Duration::from_millis(100));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use crate::bus::{ActionDescription, InMemoryBus, MessageBus, TaskStart};
    use crate::llm::{MockLlmClient, RecordingLlmClient};
    use crate::memory::{MemberArtifacts, INFO_FILE, LLM_HISTORY_FILE, SCRATCHPAD_FILE};
    use crate::react::{AgentSettings, CollaborativeAgent, PromptTemplates};

    struct CountingEnvironment {
        members: Vec<String>,
        steps: usize,
    }

    impl TaskEnvironment for CountingEnvironment {
        fn task_start(&self) -> TaskStart {
            TaskStart {
                team_members: self.members.clone(),
                task_description: "Count to three.".into(),
                action_space: vec![ActionDescription::new("count", "COUNT()")],
                example: None,
            }
        }

        fn reset(&mut self) -> Value {
            self.steps = 0;
            json!({"count": 0})
        }

        fn step(&mut self, _sender: &str, _action: &str) -> Value {
            self.steps += 1;
            json!({"count": self.steps})
        }

        fn is_terminal(&self) -> bool {
            self.steps >= 3
        }
    }

    fn member_options(name: &str, result_dir: &std::path::Path) -> MemberOptions {
        MemberOptions {
            name: name.into(),
            session_id: "travel_planning_0".into(),
            wait_time: Duration::ZERO,
            max_steps: 0,
            add_tick: false,
            idle_timeout: Duration::from_secs(10),
            result_dir: result_dir.to_path_buf(),
        }
    }

    fn counting_agent() -> CollaborativeAgent {
        // 每回合：更新暂存区 → 计划 2 → COUNT()
        let mut replies = Vec::new();
        for _ in 0..10 {
            replies.push("Action: counting".to_string());
            replies.push("Plan: 2".to_string());
            replies.push("Action: COUNT()".to_string());
        }
        let llm = Arc::new(RecordingLlmClient::new(Arc::new(MockLlmClient::with_replies(replies)), 5));
        CollaborativeAgent::new(llm, &PromptTemplates::default(), AgentSettings::default())
    }

    #[tokio::test]
    async fn test_session_end_to_end_in_process() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
        let shutdown = CancellationToken::new();

        let mut members = Vec::new();
        for name in ["agent_a", "agent_b"] {
            let member = AgentMember::new(member_options(name, dir.path()), counting_agent(), bus.clone());
            members.push(tokio::spawn(member.run(shutdown.clone())));
        }

        let env = CountingEnvironment {
            members: vec!["agent_a".into(), "agent_b".into()],
            steps: 0,
        };
        let node = EnvironmentNode::new(env, bus.clone(), "travel_planning_0", 30);
        let outcome = tokio::time::timeout(Duration::from_secs(10), node.run(shutdown.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, EnvironmentOutcome::Terminal);

        for handle in members {
            let reason = tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert!(matches!(reason, ExitReason::Ended(_)));
        }

        for name in ["agent_a", "agent_b"] {
            let artifacts = MemberArtifacts::new(dir.path(), name);
            for file in [INFO_FILE, SCRATCHPAD_FILE, LLM_HISTORY_FILE] {
                assert!(artifacts.dir().join(file).exists(), "{name}/{file} missing");
            }
            assert_eq!(artifacts.load_info().unwrap().lm, "mock");
        }
    }

    #[test]
    fn test_step_limit() {
        let mut opts = member_options("a", std::path::Path::new("/tmp"));
        assert!(!opts.step_limit_reached(100));
        opts.max_steps = 2;
        assert!(!opts.step_limit_reached(1));
        assert!(opts.step_limit_reached(2));
    }
}
