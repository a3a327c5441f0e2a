//! 受监管的成员子进程
//!
//! 每个子进程交给一个后台任务持有：等待退出或收到取消。
//! 取消时先发 SIGTERM（成员进程借此落盘），宽限期后仍未退出则 SIGKILL。
//! 退出结果经 watch 通道发布，任意多个调用方都可以 `wait()`。
//! 子进程设置 kill_on_drop，监管任务被中止时进程也不会遗留。

use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::RunnerError;

/// 子进程退出结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// 自行退出
    Exited { code: Option<i32> },
    /// 收到 SIGTERM 后在宽限期内退出
    Terminated { code: Option<i32> },
    /// 宽限期过后被强制杀死
    Killed,
    /// 无法获取退出状态
    Lost(String),
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ExitOutcome::Exited { code: Some(0) } | ExitOutcome::Terminated { code: Some(0) }
        )
    }
}

pub struct MemberHandle {
    name: String,
    pid: Option<u32>,
    cancel: CancellationToken,
    status: watch::Receiver<Option<ExitOutcome>>,
}

impl MemberHandle {
    /// 启动子进程并交给监管任务
    pub fn spawn(name: impl Into<String>, mut command: Command, grace: Duration) -> Result<Arc<Self>, RunnerError> {
        let name = name.into();
        command.kill_on_drop(true);
        let mut child = command.spawn().map_err(|e| RunnerError::ProcessLaunch {
            member: name.clone(),
            reason: e.to_string(),
        })?;
        let pid = child.id();

        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let member = name.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => ExitOutcome::Exited { code: status.code() },
                    Err(e) => ExitOutcome::Lost(e.to_string()),
                },
                _ = token.cancelled() => terminate(&mut child, grace, &member).await,
            };
            tracing::debug!(member = %member, ?outcome, "member process finished");
            let _ = tx.send(Some(outcome));
        });

        tracing::info!(member = %name, pid = ?pid, "member process launched");
        Ok(Arc::new(Self {
            name,
            pid,
            cancel,
            status: rx,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.status.borrow().is_none()
    }

    pub fn exit_outcome(&self) -> Option<ExitOutcome> {
        self.status.borrow().clone()
    }

    /// 请求终止；不等待，可重复调用
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    /// 等待子进程结束
    pub async fn wait(&self) -> ExitOutcome {
        let mut rx = self.status.clone();
        let outcome = match rx.wait_for(|status| status.is_some()).await {
            Ok(status) => status.clone(),
            Err(_) => return ExitOutcome::Lost("supervisor task stopped".to_string()),
        };
        outcome.unwrap_or_else(|| ExitOutcome::Lost("no exit status".to_string()))
    }
}

async fn terminate(child: &mut Child, grace: Duration, member: &str) -> ExitOutcome {
    // 已经退出的进程直接收尸
    if let Ok(Some(status)) = child.try_wait() {
        return ExitOutcome::Exited { code: status.code() };
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!(member = %member, error = %e, "SIGTERM failed");
        }
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => return ExitOutcome::Terminated { code: status.code() },
            Ok(Err(e)) => return ExitOutcome::Lost(e.to_string()),
            Err(_) => {
                tracing::warn!(member = %member, grace_secs = grace.as_secs(), "member ignored SIGTERM, killing");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    match child.kill().await {
        Ok(()) => ExitOutcome::Killed,
        Err(e) => ExitOutcome::Lost(e.to_string()),
    }
}
