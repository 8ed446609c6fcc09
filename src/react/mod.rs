//! 认知层：输出解析、提示词、ReAct 推理循环、失败反思、反思重试控制器、Reference 策略组件

pub mod loop_;
pub mod parser;
pub mod prompts;
pub mod reference;
pub mod reflector;
pub mod reflexion;

pub use loop_::{LoopConfig, LoopOutcome, ReasoningLoop, TerminationReason};
pub use parser::{parse_reasoning_output, ActionCall, ReasoningOutput};
pub use reference::{ExampleBank, ReferencePredicate, SolvedExample, StepReflector};
pub use reflector::Reflector;
pub use reflexion::{Attempt, AttemptPredicate, ReflectiveRetry, RetryOutcome};
