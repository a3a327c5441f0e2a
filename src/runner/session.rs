//! 会话 Runner：一个会话一组成员进程
//!
//! 状态机见 `core::state`。进程表只保存 `Arc<MemberHandle>`，
//! 信号路径与主流程可以同时读取；所有 await 之前先拍快照释放锁。

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::process::Command;

use crate::config::TeamMemberConfig;
use crate::core::{RunnerError, RunnerEvent, RunnerState};
use crate::runner::process::{ExitOutcome, MemberHandle};

pub const ENVIRONMENT_NODE_NAME: &str = "environment";

/// 一次会话的启动参数
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub session_id: String,
    pub env_config_path: PathBuf,
    pub result_dir: PathBuf,
    pub members: Vec<TeamMemberConfig>,
    pub max_steps: usize,
    pub disable_collaboration: bool,
    pub add_tick: bool,
}

/// 把会话与成员翻译成子进程命令
pub trait MemberLauncher: Send + Sync {
    /// 启动进程前的会话准备
    fn prepare_session(&self, _spec: &SessionSpec) -> Result<(), RunnerError> {
        Ok(())
    }

    fn member_command(&self, spec: &SessionSpec, member: &TeamMemberConfig) -> Command;

    /// 外部环境节点命令；None 表示不启动
    fn environment_command(&self, _spec: &SessionSpec) -> Option<Command> {
        None
    }
}

/// 启动 `cogym-member` 可执行文件
#[derive(Debug, Clone)]
pub struct BinaryLauncher {
    pub member_binary: PathBuf,
    pub secret_path: PathBuf,
    pub message_bus_url: String,
    pub config_path: Option<PathBuf>,
    pub env_node_command: Option<Vec<String>>,
}

impl BinaryLauncher {
    /// 未显式配置时取当前可执行文件同目录下的 cogym-member
    pub fn default_member_binary() -> Result<PathBuf, RunnerError> {
        let exe = std::env::current_exe()
            .map_err(|e| RunnerError::Config(format!("cannot locate current executable: {}", e)))?;
        let dir = exe
            .parent()
            .ok_or_else(|| RunnerError::Config(format!("{} has no parent directory", exe.display())))?;
        Ok(dir.join(format!("cogym-member{}", std::env::consts::EXE_SUFFIX)))
    }
}

impl MemberLauncher for BinaryLauncher {
    fn prepare_session(&self, spec: &SessionSpec) -> Result<(), RunnerError> {
        crate::bus::clear_session(&self.message_bus_url, &spec.session_id)
            .map_err(|e| RunnerError::Config(format!("message bus: {}", e)))
    }

    fn member_command(&self, spec: &SessionSpec, member: &TeamMemberConfig) -> Command {
        let mut cmd = Command::new(&self.member_binary);
        cmd.arg("--name")
            .arg(&member.name)
            .arg("--session-id")
            .arg(&spec.session_id)
            .arg("--role")
            .arg(member.role.as_str())
            .arg("--model-name")
            .arg(&member.model_name)
            .arg("--wait-time")
            .arg(member.wait_time.to_string())
            .arg("--max-steps")
            .arg(spec.max_steps.to_string())
            .arg("--result-dir")
            .arg(&spec.result_dir)
            .arg("--secret-path")
            .arg(&self.secret_path)
            .arg("--message-bus-url")
            .arg(&self.message_bus_url);
        if let Some(lm_url) = &member.lm_url {
            cmd.arg("--lm-url").arg(lm_url);
        }
        if spec.disable_collaboration {
            cmd.arg("--disable-collaboration");
        }
        if spec.add_tick {
            cmd.arg("--add-tick");
        }
        if let Some(config) = &self.config_path {
            cmd.arg("--config").arg(config);
        }
        cmd
    }

    fn environment_command(&self, spec: &SessionSpec) -> Option<Command> {
        let (program, args) = self.env_node_command.as_ref()?.split_first()?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--session-id")
            .arg(&spec.session_id)
            .arg("--env-config-path")
            .arg(&spec.env_config_path)
            .arg("--message-bus-url")
            .arg(&self.message_bus_url)
            .arg("--max-steps")
            .arg(spec.max_steps.to_string());
        Some(cmd)
    }
}

pub struct SessionRunner {
    launcher: Arc<dyn MemberLauncher>,
    kill_grace: Duration,
    state: Mutex<RunnerState>,
    handles: Mutex<Vec<Arc<MemberHandle>>>,
}

impl SessionRunner {
    pub fn new(launcher: Arc<dyn MemberLauncher>, kill_grace: Duration) -> Self {
        Self {
            launcher,
            kill_grace,
            state: Mutex::new(RunnerState::Idle),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn apply(&self, event: RunnerEvent) -> Result<RunnerState, RunnerError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let next = state.transition(event)?;
        *state = next.clone();
        Ok(next)
    }

    /// 进程表快照
    pub fn handles(&self) -> Vec<Arc<MemberHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 仍在运行的成员名
    pub fn live_members(&self) -> Vec<String> {
        self.handles()
            .iter()
            .filter(|h| h.is_running())
            .map(|h| h.name().to_string())
            .collect()
    }

    /// 清空进程表并回到 Idle；表里仍在运行的进程会先收到终止请求
    pub fn reset(&self) {
        let stale = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in stale.iter().filter(|h| h.is_running()) {
            tracing::warn!(member = %handle.name(), "terminating leftover member on reset");
            handle.terminate();
        }
        // Reset 在任何状态下都合法
        let _ = self.apply(RunnerEvent::Reset);
    }

    /// 为每个成员启动一个进程，全部启动后返回
    ///
    /// 已有存活会话时返回 `AlreadyRunning`，不启动任何进程。
    /// 任一成员启动失败时终止已启动的进程并回到 Idle。
    pub fn start_session(&self, spec: &SessionSpec) -> Result<(), RunnerError> {
        self.apply(RunnerEvent::Start {
            session_id: spec.session_id.clone(),
        })?;

        let launched = self
            .launcher
            .prepare_session(spec)
            .and_then(|()| self.launch_all(spec));
        match launched {
            Ok(launched) => {
                let count = launched.len();
                self.handles
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend(launched);
                self.apply(RunnerEvent::Launched)?;
                tracing::info!(session_id = %spec.session_id, processes = count, "session running");
                Ok(())
            }
            Err(e) => {
                let _ = self.apply(RunnerEvent::LaunchFailed);
                Err(e)
            }
        }
    }

    fn launch_all(&self, spec: &SessionSpec) -> Result<Vec<Arc<MemberHandle>>, RunnerError> {
        let mut launched: Vec<Arc<MemberHandle>> = Vec::with_capacity(spec.members.len() + 1);
        let mut commands: Vec<(String, Command)> = spec
            .members
            .iter()
            .map(|m| (m.name.clone(), self.launcher.member_command(spec, m)))
            .collect();
        if let Some(cmd) = self.launcher.environment_command(spec) {
            commands.push((ENVIRONMENT_NODE_NAME.to_string(), cmd));
        }

        for (name, command) in commands {
            match MemberHandle::spawn(name, command, self.kill_grace) {
                Ok(handle) => launched.push(handle),
                Err(e) => {
                    tracing::error!(session_id = %spec.session_id, error = %e, "launch failed, rolling back");
                    for handle in &launched {
                        handle.terminate();
                    }
                    return Err(e);
                }
            }
        }
        Ok(launched)
    }

    /// 等待进程表中所有进程退出
    pub async fn wait_all(&self) -> Vec<(String, ExitOutcome)> {
        let handles = self.handles();
        let outcomes = join_all(handles.iter().map(|h| h.wait())).await;
        // 被强制停止后状态已是 Idle，此时转移失败无妨
        let _ = self.apply(RunnerEvent::AllExited);
        handles
            .iter()
            .map(|h| h.name().to_string())
            .zip(outcomes)
            .collect()
    }

    /// 终止并回收所有存活进程；可重复、可并发调用
    pub async fn cleanup_subprocesses(&self) {
        let handles = self.handles();
        let live = handles.iter().filter(|h| h.is_running()).count();
        if live > 0 {
            tracing::info!(count = live, "cleaning up member processes");
        }
        for handle in &handles {
            handle.terminate();
        }
        join_all(handles.iter().map(|h| h.wait())).await;
        let _ = self.apply(RunnerEvent::ForceStop);
    }
}

impl Drop for SessionRunner {
    fn drop(&mut self) {
        for handle in self.handles.get_mut().unwrap_or_else(|e| e.into_inner()).iter() {
            handle.terminate();
        }
    }
}
