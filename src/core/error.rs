//! 会话编排错误类型
//!
//! 与批量驱动配合：ConfigError / ProcessLaunchError 只中止当前会话，批量循环记录后继续下一个编号；
//! AlreadyRunning / InvalidTransition 是状态机被误用，属于编程错误。

use thiserror::Error;

use crate::core::state::{RunnerEvent, RunnerState};

/// Runner 与批量驱动可能出现的错误
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to launch member '{member}': {reason}")]
    ProcessLaunch { member: String, reason: String },

    #[error("Session '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Invalid runner transition from {from:?} on {event:?}")]
    InvalidTransition {
        from: RunnerState,
        event: RunnerEvent,
    },
}

impl RunnerError {
    /// 是否只影响当前会话（批量循环可以继续）
    pub fn is_session_scoped(&self) -> bool {
        matches!(self, RunnerError::Config(_) | RunnerError::ProcessLaunch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_scoped() {
        assert!(RunnerError::Config("x".into()).is_session_scoped());
        assert!(RunnerError::ProcessLaunch {
            member: "a".into(),
            reason: "enoent".into()
        }
        .is_session_scoped());
        assert!(!RunnerError::AlreadyRunning("s".into()).is_session_scoped());
    }
}
