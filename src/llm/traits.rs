//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：单次 prompt 进、文本出。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 单次补全请求：回合决策全程使用 temperature = 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn deterministic(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.0,
            max_tokens,
        }
    }
}

/// LLM 调用失败（网络、超时、空补全）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM returned an empty completion")]
    EmptyCompletion,
}

/// 累计 token 使用：(prompt_tokens, completion_tokens)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// 模型名（写入 info.json）
    fn model_name(&self) -> &str;

    /// 获取累计 token 使用统计；默认 0，具体实现可覆盖
    fn token_usage(&self) -> TokenCounts {
        TokenCounts::default()
    }
}
