//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock），调用记录与后端选择

pub mod factory;
pub mod mock;
pub mod openai;
pub mod recorder;
pub mod traits;

pub use factory::{create_llm_client, Provider};
pub use mock::{MockLlmClient, MOCK_FALLBACK_REPLY};
pub use openai::{OpenAiClient, TokenUsage};
pub use recorder::{LlmCall, RecordingLlmClient};
pub use traits::{CompletionRequest, LlmClient, LlmError, TokenCounts};
