//! 文件总线：`<dir>/<session>.jsonl` 追加写，订阅端按固定间隔从上次偏移继续读
//!
//! 每条消息一行、一次 write 调用写完，多进程 O_APPEND 写入不会交错。
//! 只消费以换行结尾的完整行；解析失败的行记录警告后跳过。

use std::io::{SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{validate_session_id, BusError, BusEvent, BusMessage, BusSubscription, MessageBus};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SUBSCRIPTION_BUFFER: usize = 256;

pub struct FileBus {
    dir: PathBuf,
    poll_interval: Duration,
}

impl FileBus {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, BusError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", session_id))
    }
}

/// 从 offset 读到文件末尾；文件不存在视为空
async fn read_from(path: &Path, offset: u64) -> std::io::Result<Vec<u8>> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;
    Ok(buf)
}

#[async_trait]
impl MessageBus for FileBus {
    async fn publish(&self, session_id: &str, event: BusEvent) -> Result<Uuid, BusError> {
        validate_session_id(session_id)?;
        let msg = BusMessage::new(session_id, event);
        let mut line = serde_json::to_vec(&msg)?;
        line.push(b'\n');
        let path = self.session_path(session_id);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(&line)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(msg.id)
    }

    async fn subscribe(&self, session_id: &str) -> Result<BusSubscription, BusError> {
        validate_session_id(session_id)?;
        let path = self.session_path(session_id);
        let poll_interval = self.poll_interval;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let pump = tokio::spawn(async move {
            let mut offset: u64 = 0;
            let mut pending: Vec<u8> = Vec::new();
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                let chunk = match read_from(&path, offset).await {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to read bus file");
                        continue;
                    }
                };
                offset += chunk.len() as u64;
                pending.extend_from_slice(&chunk);

                while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    let line = &line[..line.len() - 1];
                    if line.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    match serde_json::from_slice::<BusMessage>(line) {
                        Ok(msg) => {
                            if tx.send(msg).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "skipping malformed bus line");
                        }
                    }
                }
            }
        });
        Ok(BusSubscription::new(rx, Some(pump)))
    }
}
