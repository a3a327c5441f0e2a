//! 进程内总线：每个会话一个 broadcast 通道 + 消息日志（供新订阅者回放）

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::{validate_session_id, BusError, BusEvent, BusMessage, BusSubscription, MessageBus};

const BROADCAST_CAPACITY: usize = 1024;
const SUBSCRIPTION_BUFFER: usize = 256;

struct SessionChannel {
    log: Vec<BusMessage>,
    tx: broadcast::Sender<BusMessage>,
}

impl SessionChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { log: Vec::new(), tx }
    }
}

#[derive(Default)]
pub struct InMemoryBus {
    sessions: Mutex<HashMap<String, SessionChannel>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 会话内已发布的消息数
    pub fn message_count(&self, session_id: &str) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).map(|s| s.log.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, session_id: &str, event: BusEvent) -> Result<Uuid, BusError> {
        validate_session_id(session_id)?;
        let msg = BusMessage::new(session_id, event);
        let id = msg.id;
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let channel = sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionChannel::new);
        channel.log.push(msg.clone());
        // 没有订阅者时发送失败，消息仍留在日志里
        let _ = channel.tx.send(msg);
        Ok(id)
    }

    async fn subscribe(&self, session_id: &str) -> Result<BusSubscription, BusError> {
        validate_session_id(session_id)?;
        // 快照与订阅在同一把锁内完成，回放与实时消息之间没有缺口
        let (backlog, mut live) = {
            let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            let channel = sessions
                .entry(session_id.to_string())
                .or_insert_with(SessionChannel::new);
            (channel.log.clone(), channel.tx.subscribe())
        };

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let session = session_id.to_string();
        let pump = tokio::spawn(async move {
            for msg in backlog {
                if tx.send(msg).await.is_err() {
                    return;
                }
            }
            loop {
                match live.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(session_id = %session, skipped = n, "in-memory bus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(BusSubscription::new(rx, Some(pump)))
    }
}
