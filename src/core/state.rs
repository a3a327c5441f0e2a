//! Runner 状态机：显式状态 + 转移表
//!
//! Idle -> SessionStarting -> SessionRunning -> SessionEnded -> Idle（reset）；
//! 外部终止（信号、清理）可从任意状态强制回到 Idle。

use serde::Serialize;

use crate::core::RunnerError;

/// Runner 当前状态；会话相关状态携带 session id
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub enum RunnerState {
    #[default]
    Idle,
    SessionStarting { session_id: String },
    SessionRunning { session_id: String },
    SessionEnded { session_id: String },
}

/// 驱动状态转移的事件
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RunnerEvent {
    Start { session_id: String },
    Launched,
    LaunchFailed,
    AllExited,
    Reset,
    ForceStop,
}

impl RunnerState {
    /// 当前是否有存活的会话（Starting / Running）
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            RunnerState::SessionStarting { .. } | RunnerState::SessionRunning { .. }
        )
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            RunnerState::Idle => None,
            RunnerState::SessionStarting { session_id }
            | RunnerState::SessionRunning { session_id }
            | RunnerState::SessionEnded { session_id } => Some(session_id),
        }
    }

    /// 转移表；非法转移返回错误且不改变状态
    pub fn transition(&self, event: RunnerEvent) -> Result<RunnerState, RunnerError> {
        use RunnerEvent as E;
        use RunnerState as S;

        match (self, event) {
            (_, E::Reset) | (_, E::ForceStop) => Ok(S::Idle),
            (S::Idle, E::Start { session_id }) => Ok(S::SessionStarting { session_id }),
            (S::SessionStarting { session_id } | S::SessionRunning { session_id }, E::Start { .. }) => {
                Err(RunnerError::AlreadyRunning(session_id.clone()))
            }
            (S::SessionStarting { session_id }, E::Launched) => Ok(S::SessionRunning {
                session_id: session_id.clone(),
            }),
            (S::SessionStarting { .. }, E::LaunchFailed) => Ok(S::Idle),
            (S::SessionRunning { session_id }, E::AllExited) => Ok(S::SessionEnded {
                session_id: session_id.clone(),
            }),
            // 已结束的会话重复 wait 无副作用
            (S::SessionEnded { session_id }, E::AllExited) => Ok(S::SessionEnded {
                session_id: session_id.clone(),
            }),
            (from, event) => Err(RunnerError::InvalidTransition {
                from: from.clone(),
                event,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(id: &str) -> RunnerEvent {
        RunnerEvent::Start {
            session_id: id.to_string(),
        }
    }

    #[test]
    fn test_happy_path() {
        let s = RunnerState::Idle;
        let s = s.transition(start("t_0")).unwrap();
        assert!(s.is_live());
        let s = s.transition(RunnerEvent::Launched).unwrap();
        assert_eq!(
            s,
            RunnerState::SessionRunning {
                session_id: "t_0".into()
            }
        );
        let s = s.transition(RunnerEvent::AllExited).unwrap();
        assert!(!s.is_live());
        assert_eq!(s.session_id(), Some("t_0"));
        let s = s.transition(RunnerEvent::Reset).unwrap();
        assert_eq!(s, RunnerState::Idle);
    }

    #[test]
    fn test_start_while_live_is_already_running() {
        let running = RunnerState::SessionRunning {
            session_id: "t_0".into(),
        };
        match running.transition(start("t_1")) {
            Err(RunnerError::AlreadyRunning(id)) => assert_eq!(id, "t_0"),
            other => panic!("Expected AlreadyRunning, got {:?}", other),
        }
        let starting = RunnerState::SessionStarting {
            session_id: "t_0".into(),
        };
        assert!(matches!(
            starting.transition(start("t_1")),
            Err(RunnerError::AlreadyRunning(_))
        ));
    }

    #[test]
    fn test_start_after_end_requires_reset() {
        let ended = RunnerState::SessionEnded {
            session_id: "t_0".into(),
        };
        assert!(matches!(
            ended.transition(start("t_1")),
            Err(RunnerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_force_stop_from_anywhere() {
        for s in [
            RunnerState::Idle,
            RunnerState::SessionStarting { session_id: "a".into() },
            RunnerState::SessionRunning { session_id: "a".into() },
            RunnerState::SessionEnded { session_id: "a".into() },
        ] {
            assert_eq!(s.transition(RunnerEvent::ForceStop).unwrap(), RunnerState::Idle);
        }
    }

    #[test]
    fn test_launch_failed_returns_idle() {
        let s = RunnerState::SessionStarting {
            session_id: "a".into(),
        };
        assert_eq!(s.transition(RunnerEvent::LaunchFailed).unwrap(), RunnerState::Idle);
        assert!(RunnerState::Idle.transition(RunnerEvent::Launched).is_err());
    }
}
