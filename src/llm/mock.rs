//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序弹出预置脚本（文本或错误）；脚本用尽后回复一个 Final Answer，
//! 回显最后一条 User 消息，便于本地跑通整条流程。同时记录每次收到的 prompt，供测试断言。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmResponse};
use crate::memory::{Message, Role};

/// Mock 客户端：脚本化回复 + prompt 记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<LlmResponse, String>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定文本
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for r in responses {
            client.push_response(LlmResponse::text(r));
        }
        client
    }

    pub fn push_response(&self, response: LlmResponse) {
        lock(&self.script).push_back(Ok(response));
    }

    pub fn push_error(&self, error: impl Into<String>) {
        lock(&self.script).push_back(Err(error.into()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的完整消息列表
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        lock(&self.prompts).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<LlmResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(messages.to_vec());

        if let Some(next) = lock(&self.script).pop_front() {
            return next;
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(LlmResponse::text(format!(
            "Thought: nothing left to do\nFinal Answer: Echo from Mock: {}",
            last_user
        )))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let mock = MockLlmClient::scripted(["first"]);
        mock.push_error("boom");
        let msgs = vec![Message::user("hello")];

        assert_eq!(mock.complete(&msgs).await.unwrap().content, "first");
        assert_eq!(mock.complete(&msgs).await.unwrap_err(), "boom");
        let fallback = mock.complete(&msgs).await.unwrap();
        assert!(fallback.content.contains("Final Answer: Echo from Mock: hello"));
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.prompts().len(), 3);
    }
}
