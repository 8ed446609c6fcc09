//! 核心层：错误与恢复、执行轨迹、任务级运行上下文

pub mod context;
pub mod error;
pub mod recovery;
pub mod trace;

pub use context::RunContext;
pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use trace::{Step, Trace};
