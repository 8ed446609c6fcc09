//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete 返回结构化响应，
//! 其中 usage 可选；缺失时由遥测层按字符数估算。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::memory::Message;

/// 单次调用的 token 使用量（由后端返回）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// 结构化模型响应：文本内容 + 可选 usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

impl LlmResponse {
    /// 仅文本、无 usage 的响应
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = Some(TokenUsage {
            prompt_tokens,
            completion_tokens,
        });
        self
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<LlmResponse, String>;

    /// 模型名（写入 CallMetric，用于成本估算）
    fn model_name(&self) -> &str {
        "unknown"
    }
}
