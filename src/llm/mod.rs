//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmResponse, TokenUsage};

use crate::config::LlmSection;
use crate::core::AgentError;

/// DeepSeek 走 OpenAI 兼容接口，只是地址、默认模型与密钥变量不同
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
const DEEPSEEK_DEFAULT_MODEL: &str = "deepseek-chat";

/// 按顺序取第一个已设置的环境变量
fn api_key(vars: &[&str]) -> Option<String> {
    vars.iter().find_map(|v| std::env::var(v).ok())
}

/// 按 [llm] 配置创建客户端：mock / openai / deepseek
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, AgentError> {
    match cfg.provider.to_lowercase().as_str() {
        "mock" => {
            tracing::warn!("Using Mock LLM (scripted fallback only)");
            Ok(Arc::new(MockLlmClient::new()))
        }
        "deepseek" => {
            let model = cfg.model.as_deref().unwrap_or(DEEPSEEK_DEFAULT_MODEL);
            let base_url = cfg.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
            tracing::info!(model, base_url, "Using DeepSeek LLM");
            Ok(Arc::new(
                OpenAiClient::new(
                    Some(base_url),
                    model,
                    api_key(&["DEEPSEEK_API_KEY", "OPENAI_API_KEY"]).as_deref(),
                )
                .with_timeout(cfg.request_timeout_secs),
            ))
        }
        "openai" => {
            let model = cfg.model.as_deref().unwrap_or("gpt-4o-mini");
            tracing::info!("Using OpenAI LLM ({})", model);
            Ok(Arc::new(
                OpenAiClient::new(
                    cfg.base_url.as_deref(),
                    model,
                    api_key(&["OPENAI_API_KEY"]).as_deref(),
                )
                .with_timeout(cfg.request_timeout_secs),
            ))
        }
        other => Err(AgentError::ConfigError(format!(
            "unknown llm provider: {other}"
        ))),
    }
}
