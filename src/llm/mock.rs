//! Mock LLM 客户端（用于测试与离线演练，无需 API）
//!
//! 按顺序返回预置回复；队列耗尽后返回固定的「等待」计划。token 用空白分词粗略计数。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionRequest, LlmClient, LlmError, TokenCounts};

/// 队列耗尽后的默认回复：计划中不含 1/2，即本回合等待
pub const MOCK_FALLBACK_REPLY: &str = "Thought: Nothing to do yet.\nPlan: 3";

/// Mock 客户端：脚本化回复 + 记录收到的 prompt
#[derive(Debug)]
pub struct MockLlmClient {
    model: String,
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::scripted(Vec::<Result<String, LlmError>>::new())
    }

    pub fn scripted(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            model: "mock".to_string(),
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
            prompt_tokens: AtomicU64::new(0),
            completion_tokens: AtomicU64::new(0),
        }
    }

    /// 便捷构造：全部为成功回复
    pub fn with_replies<S: Into<String>>(replies: impl IntoIterator<Item = S>) -> Self {
        Self::scripted(replies.into_iter().map(|r| Ok(r.into())))
    }

    /// 已收到的 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> TokenCounts {
        TokenCounts {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.prompt.clone());
        self.prompt_tokens
            .fetch_add(request.prompt.split_whitespace().count() as u64, Ordering::Relaxed);

        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(MOCK_FALLBACK_REPLY.to_string()));

        if let Ok(text) = &next {
            self.completion_tokens
                .fetch_add(text.split_whitespace().count() as u64, Ordering::Relaxed);
        }
        next
    }
}
