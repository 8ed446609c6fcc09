//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithPrompt / Abort。
//! 注册表层的错误（ActionNotFound / 参数校验 / ProviderException）不会向上抛出，
//! 而是以 Display 文本作为失败 ActionResult 的 observation。

use thiserror::Error;

/// 任务执行过程中可能出现的错误（动作、参数、解析、预算、LLM 等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("missing argument {0}")]
    MissingArgument(String),

    #[error("invalid argument {field}: expected {expected}")]
    InvalidArgument { field: String, expected: String },

    /// 动作处理器自身报错（在注册表边界被捕获）
    #[error("exception: {0}")]
    ProviderException(String),

    #[error("Parse failure: {0}")]
    ParseFailure(String),

    #[error("Iteration budget exceeded ({0} iterations)")]
    BudgetExceeded(usize),

    #[error("Execution time exceeded ({0:.1}s)")]
    Timeout(f64),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Plan error: {0}")]
    PlanError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// 参数校验类错误（缺失或类型不符）
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            AgentError::MissingArgument(_) | AgentError::InvalidArgument { .. }
        )
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 将提示注入下一轮，让 LLM 重试（如输出格式错误）
    RetryWithPrompt(String),
    /// 终止当前尝试
    Abort,
}
