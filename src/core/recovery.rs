//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供推理循环决定是带提示重试还是终止当前尝试。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作（重试提示 / 终止）
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ParseFailure(raw) => RecoveryAction::RetryWithPrompt(format!(
                "Invalid format: {raw}. \
                Reply with either\n\
                Thought: <reasoning>\nAction: <action name>\nAction Input: <JSON object>\n\
                or\n\
                Thought: <reasoning>\nFinal Answer: <summary of what you did>\n\
                Do not write anything else."
            )),
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_parse_failure() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ParseFailure("no action".to_string());
        match engine.handle(&err) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("no action"));
                assert!(msg.contains("Final Answer"));
            }
            _ => panic!("Expected RetryWithPrompt"),
        }
    }

    #[test]
    fn test_recovery_llm_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::LlmError("rate limited".to_string());
        assert!(matches!(engine.handle(&err), RecoveryAction::Abort));
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert!(matches!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort));
    }
}
