//! 会话消息总线
//!
//! 环境节点与各成员进程通过总线交换 TaskStart / Observation / Action / End。
//! - `memory://`：进程内广播，测试与嵌入使用
//! - `file://<dir>`：每个会话一个 JSONL 追加文件，订阅端轮询追读，可跨进程
//!
//! 订阅从会话开头回放，信封 id 去重，因此晚加入的订阅者也能看到 TaskStart。

pub mod file;
pub mod memory;
pub mod message;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub use file::FileBus;
pub use memory::InMemoryBus;
pub use message::{ActionDescription, BusEvent, BusMessage, TaskExample, TaskStart};

const MEMORY_SCHEME: &str = "memory://";
const FILE_SCHEME: &str = "file://";

#[derive(Error, Debug)]
pub enum BusError {
    #[error("unsupported message bus url: {0}")]
    UnsupportedUrl(String),

    #[error("invalid session id: {0:?}")]
    InvalidSession(String),

    #[error("bus io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bus serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// 总线抽象
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 发布事件，返回信封 id
    async fn publish(&self, session_id: &str, event: BusEvent) -> Result<Uuid, BusError>;

    /// 订阅会话；从会话第一条消息开始投递
    async fn subscribe(&self, session_id: &str) -> Result<BusSubscription, BusError>;
}

/// 订阅句柄：去重后的消息流，drop 时停止后台转发任务
pub struct BusSubscription {
    rx: mpsc::Receiver<BusMessage>,
    seen: HashSet<Uuid>,
    pump: Option<JoinHandle<()>>,
}

impl BusSubscription {
    pub(crate) fn new(rx: mpsc::Receiver<BusMessage>, pump: Option<JoinHandle<()>>) -> Self {
        Self {
            rx,
            seen: HashSet::new(),
            pump,
        }
    }

    /// 下一条未见过的消息；总线关闭时返回 None
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            let msg = self.rx.recv().await?;
            if self.seen.insert(msg.id) {
                return Some(msg);
            }
            tracing::trace!(id = %msg.id, "duplicate bus message dropped");
        }
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// 会话 id 会用作文件名，只允许字母数字与 `-_.`
pub(crate) fn validate_session_id(session_id: &str) -> Result<(), BusError> {
    let ok = !session_id.is_empty()
        && session_id != "."
        && session_id != ".."
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(BusError::InvalidSession(session_id.to_string()))
    }
}

enum BusUrl {
    Memory,
    File(PathBuf),
}

fn parse_url(url: &str) -> Result<BusUrl, BusError> {
    if url == MEMORY_SCHEME || url == "memory" {
        return Ok(BusUrl::Memory);
    }
    if let Some(dir) = url.strip_prefix(FILE_SCHEME) {
        if dir.is_empty() {
            return Err(BusError::UnsupportedUrl(url.to_string()));
        }
        return Ok(BusUrl::File(PathBuf::from(dir)));
    }
    if url.is_empty() || url.contains("://") {
        return Err(BusError::UnsupportedUrl(url.to_string()));
    }
    Ok(BusUrl::File(PathBuf::from(url)))
}

/// 按 URL 创建总线；不带 scheme 的路径按 file 处理
pub fn connect(url: &str) -> Result<Arc<dyn MessageBus>, BusError> {
    match parse_url(url)? {
        BusUrl::Memory => Ok(Arc::new(InMemoryBus::new())),
        BusUrl::File(dir) => Ok(Arc::new(FileBus::new(dir)?)),
    }
}

/// 清除会话在总线上的旧消息（同一 session id 重跑时避免回放上一次的 End）
pub fn clear_session(url: &str, session_id: &str) -> Result<(), BusError> {
    validate_session_id(session_id)?;
    match parse_url(url)? {
        BusUrl::Memory => Ok(()),
        BusUrl::File(dir) => {
            let path = dir.join(format!("{}.jsonl", session_id));
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "removed stale session log");
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
    }
}
