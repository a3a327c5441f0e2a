//! 按成员配置构建 LLM 客户端
//!
//! 后端由 [llm].provider 指定，未指定时按模型名 / 端点推断：
//! mock → MockLlmClient；设置了 lm_url → 自建 OpenAI 兼容服务（如 vLLM）；
//! gpt* → OpenAI；claude* → Anthropic 兼容端点；deepseek* → DeepSeek；together/* → Together。

use std::sync::Arc;

use crate::config::{LlmSection, Secrets, TeamMemberConfig};
use crate::core::RunnerError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const ANTHROPIC_COMPAT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Mock,
    SelfHosted,
    OpenAi,
    Anthropic,
    DeepSeek,
    Together,
}

impl Provider {
    pub fn resolve(explicit: Option<&str>, model: &str, lm_url: Option<&str>) -> Result<Self, RunnerError> {
        if let Some(p) = explicit {
            return match p.to_lowercase().as_str() {
                "mock" => Ok(Provider::Mock),
                "vllm" | "self_hosted" => Ok(Provider::SelfHosted),
                "openai" => Ok(Provider::OpenAi),
                "anthropic" | "claude" => Ok(Provider::Anthropic),
                "deepseek" => Ok(Provider::DeepSeek),
                "together" => Ok(Provider::Together),
                other => Err(RunnerError::Config(format!("Unsupported LLM provider: {}", other))),
            };
        }
        let m = model.to_lowercase();
        if m == "mock" {
            Ok(Provider::Mock)
        } else if lm_url.is_some() {
            Ok(Provider::SelfHosted)
        } else if m.contains("gpt") {
            Ok(Provider::OpenAi)
        } else if m.contains("claude") {
            Ok(Provider::Anthropic)
        } else if m.contains("deepseek") {
            Ok(Provider::DeepSeek)
        } else if m.contains('/') {
            Ok(Provider::Together)
        } else {
            Err(RunnerError::Config(format!("Unsupported model name: {}", model)))
        }
    }

    fn key_name(&self) -> Option<&'static str> {
        match self {
            Provider::Mock | Provider::SelfHosted => None,
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Provider::Together => Some("TOGETHER_API_KEY"),
        }
    }
}

/// 构建成员使用的 LLM 客户端；需要的密钥缺失时返回配置错误
pub fn create_llm_client(
    member: &TeamMemberConfig,
    llm: &LlmSection,
    secrets: &Secrets,
) -> Result<Arc<dyn LlmClient>, RunnerError> {
    let lm_url = member.lm_url.as_deref().or(llm.base_url.as_deref());
    let provider = Provider::resolve(llm.provider.as_deref(), &member.model_name, lm_url)?;

    let api_key = match provider.key_name() {
        Some(name) => secrets
            .get(name)
            .ok_or_else(|| RunnerError::Config(format!("{} missing from secrets", name)))?
            .to_string(),
        None => "EMPTY".to_string(),
    };

    let base_url = match provider {
        Provider::Mock => {
            tracing::info!(member = %member.name, "Using Mock LLM");
            return Ok(Arc::new(MockLlmClient::new()));
        }
        Provider::SelfHosted | Provider::OpenAi => lm_url,
        Provider::Anthropic => Some(lm_url.unwrap_or(ANTHROPIC_COMPAT_BASE_URL)),
        Provider::DeepSeek => Some(lm_url.unwrap_or(DEEPSEEK_BASE_URL)),
        Provider::Together => Some(lm_url.unwrap_or(TOGETHER_BASE_URL)),
    };

    tracing::info!(member = %member.name, model = %member.model_name, ?provider, "Using LLM");
    Ok(Arc::new(OpenAiClient::new(base_url, &member.model_name, &api_key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn member(model: &str, lm_url: Option<&str>) -> TeamMemberConfig {
        TeamMemberConfig {
            name: "agent".into(),
            role: crate::config::MemberRole::Agent,
            model_name: model.into(),
            lm_url: lm_url.map(String::from),
            wait_time: 0,
        }
    }

    #[test]
    fn test_resolve_by_model_name() {
        assert_eq!(Provider::resolve(None, "gpt-4o", None).unwrap(), Provider::OpenAi);
        assert_eq!(
            Provider::resolve(None, "claude-3-5-sonnet", None).unwrap(),
            Provider::Anthropic
        );
        assert_eq!(
            Provider::resolve(None, "meta-llama/Llama-3-70b", None).unwrap(),
            Provider::Together
        );
        assert_eq!(
            Provider::resolve(None, "llama", Some("http://localhost:8000")).unwrap(),
            Provider::SelfHosted
        );
        assert_eq!(Provider::resolve(Some("MOCK"), "gpt-4o", None).unwrap(), Provider::Mock);
        assert!(Provider::resolve(None, "llama", None).is_err());
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = create_llm_client(&member("gpt-4o", None), &LlmSection::default(), &Secrets::default())
            .err()
            .unwrap();
        assert!(matches!(err, RunnerError::Config(msg) if msg.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn test_mock_needs_no_key() {
        let llm = create_llm_client(&member("mock", None), &LlmSection::default(), &Secrets::default())
            .unwrap();
        assert_eq!(llm.model_name(), "mock");
    }

    #[test]
    fn test_openai_with_key() {
        let mut keys = BTreeMap::new();
        keys.insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
        let llm = create_llm_client(
            &member("gpt-4o", None),
            &LlmSection::default(),
            &Secrets::from_map(keys),
        )
        .unwrap();
        assert_eq!(llm.model_name(), "gpt-4o");
    }
}
