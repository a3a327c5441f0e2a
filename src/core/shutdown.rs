//! 优雅关闭处理
//!
//! 提供统一的关闭信号监听，批量驱动与成员进程共用：
//! - 批量驱动收到信号后清理所有成员子进程再以 0 退出
//! - 成员进程收到信号后先落盘已有的结果文件再退出

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    /// 关闭信号 token
    shutdown_token: CancellationToken,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM 信号（通常来自 Runner 清理）
    Signal,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
        }
    }

    /// 获取关闭 token（用于取消正在进行的任务）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 触发关闭；重复触发只记日志
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.shutdown_token.is_cancelled() {
            tracing::debug!(?reason, "Shutdown already in progress");
            return;
        }
        tracing::info!(?reason, "Shutting down");
        self.shutdown_token.cancel();
    }

    /// 等待关闭信号
    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
