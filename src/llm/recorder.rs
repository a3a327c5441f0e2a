//! LLM 调用记录与超时
//!
//! RecordingLlmClient 包装任意后端：每次调用套上协作式超时，并把 prompt / 参数 / 回复写入调用历史，
//! 会话结束时导出为 llm_call_history.jsonl。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::{CompletionRequest, LlmClient, LlmError, TokenCounts};

/// 单次 LLM 调用记录（jsonl 中的一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCall {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response: Option<String>,
    pub error: Option<String>,
    pub timestamp: String,
}

pub struct RecordingLlmClient {
    inner: Arc<dyn LlmClient>,
    timeout: Duration,
    history: Mutex<Vec<LlmCall>>,
}

impl RecordingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self {
            inner,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            history: Mutex::new(Vec::new()),
        }
    }

    /// 调用历史快照
    pub fn history(&self) -> Vec<LlmCall> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LlmClient for RecordingLlmClient {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn token_usage(&self) -> TokenCounts {
        self.inner.token_usage()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let result = match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
            Ok(r) => r,
            Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
        };

        let call = LlmCall {
            prompt: request.prompt.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(|e| e.to_string()),
            timestamp: chrono::Local::now().to_rfc3339(),
        };
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);

        if let Err(e) = &result {
            tracing::warn!(model = %self.inner.model_name(), error = %e, "LLM call failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    struct SlowClient;

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".into())
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_records_success_and_error() {
        let mock = Arc::new(MockLlmClient::scripted([
            Ok("Plan: 2".to_string()),
            Err(LlmError::EmptyCompletion),
        ]));
        let llm = RecordingLlmClient::new(mock, 5);
        let req = CompletionRequest::deterministic("p", 100);
        assert!(llm.complete(&req).await.is_ok());
        assert!(llm.complete(&req).await.is_err());

        let history = llm.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].response.as_deref(), Some("Plan: 2"));
        assert_eq!(history[0].max_tokens, 100);
        assert_eq!(history[0].temperature, 0.0);
        assert!(history[1].response.is_none());
        assert!(history[1].error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_llm_error() {
        let llm = RecordingLlmClient::new(Arc::new(SlowClient), 2);
        let req = CompletionRequest::deterministic("p", 10);
        assert_eq!(llm.complete(&req).await, Err(LlmError::Timeout(2)));
        assert_eq!(llm.history().len(), 1);
    }
}
