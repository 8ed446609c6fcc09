//! ReAct 推理循环
//!
//! Reason (LLM) -> Act (ActionRegistry) -> Observe -> 下一轮 Reason。
//! 每轮开始前依次检查：取消、迭代预算、挂钟时间；检查只发生在两轮之间，进行中的调用不会被打断。
//! 模型输出无法解析时交给 RecoveryEngine 生成格式提示并静默重试，连续失败超过 format_retries 次即以 ParseFailure 结束。
//! 模型调用本身出错（LlmError）向上返回，由重试控制器或顶层 run 处理。
//! 挂上 StepReflector 后，每个动作步骤之后追加一次简短反思：写进 ctx.reflections，并随观察一起喂回模型。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::actions::{action_call_schema_json, ActionRegistry};
use crate::config::EngineSection;
use crate::core::{AgentError, RecoveryAction, RecoveryEngine, RunContext, Trace};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::observability::{metered_complete, CallKind};
use crate::react::parser::{parse_reasoning_output, ReasoningOutput};
use crate::react::prompts;
use crate::react::reference::StepReflector;

/// 循环预算
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// 模型调用次数上限（格式重试也计入）
    pub max_iterations: usize,
    pub max_execution_time: Duration,
    /// 连续格式错误的静默重试次数
    pub format_retries: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&EngineSection::default())
    }
}

impl From<&EngineSection> for LoopConfig {
    fn from(cfg: &EngineSection) -> Self {
        Self {
            max_iterations: cfg.max_iterations,
            max_execution_time: Duration::from_secs_f64(cfg.max_execution_time_secs.max(0.0)),
            format_retries: cfg.format_retries,
        }
    }
}

/// 终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    FinalAnswer,
    BudgetExceeded,
    Timeout,
    ParseFailure,
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::FinalAnswer => "final answer",
            TerminationReason::BudgetExceeded => "budget exceeded",
            TerminationReason::Timeout => "timeout",
            TerminationReason::ParseFailure => "parse failure",
            TerminationReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次循环的结果；非 FinalAnswer 终止时 final_output 为空串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub trace: Trace,
    pub final_output: String,
    pub termination: TerminationReason,
    /// 实际发生的模型调用次数
    pub iterations: usize,
}

/// 推理循环：持有 LLM、只读动作注册表与 system prompt
pub struct ReasoningLoop {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ActionRegistry>,
    config: LoopConfig,
    recovery: RecoveryEngine,
    system_prompt: String,
    step_reflector: Option<StepReflector>,
}

impl ReasoningLoop {
    /// system prompt 由注册表目录与动作调用 Schema 生成
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ActionRegistry>, config: LoopConfig) -> Self {
        let system_prompt =
            prompts::reasoning_system_prompt(&registry.describe(), &action_call_schema_json());
        Self {
            llm,
            registry,
            config,
            recovery: RecoveryEngine::new(),
            system_prompt,
            step_reflector: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// 在 system prompt 末尾追加一段（如检索到的示例）
    pub fn with_prompt_appendix(mut self, appendix: &str) -> Self {
        if !appendix.is_empty() {
            self.system_prompt.push_str("\n\n");
            self.system_prompt.push_str(appendix);
        }
        self
    }

    pub fn with_step_reflector(mut self, reflector: StepReflector) -> Self {
        self.step_reflector = Some(reflector);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn llm(&self) -> Arc<dyn LlmClient> {
        Arc::clone(&self.llm)
    }

    /// 执行一次完整循环；ctx 中的反思记忆作为额外上下文注入
    pub async fn run(&self, task: &str, ctx: &mut RunContext) -> Result<LoopOutcome, AgentError> {
        let start = Instant::now();
        let reflections = ctx.reflections.to_context();
        let mut messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(prompts::task_prompt(task, &reflections)),
        ];
        let mut trace = Trace::new();
        let mut iterations = 0usize;
        let mut parse_failures = 0usize;

        let finish = |trace: Trace, final_output: String, termination: TerminationReason, iterations: usize| {
            tracing::info!(
                termination = %termination,
                steps = trace.len(),
                iterations,
                "reasoning loop finished"
            );
            LoopOutcome {
                trace,
                final_output,
                termination,
                iterations,
            }
        };

        loop {
            if ctx.is_cancelled() {
                return Ok(finish(trace, String::new(), TerminationReason::Cancelled, iterations));
            }
            if iterations >= self.config.max_iterations {
                return Ok(finish(trace, String::new(), TerminationReason::BudgetExceeded, iterations));
            }
            if start.elapsed() >= self.config.max_execution_time {
                return Ok(finish(trace, String::new(), TerminationReason::Timeout, iterations));
            }

            iterations += 1;
            tracing::debug!(iteration = iterations, steps = trace.len(), "reasoning cycle");

            let (response, _) =
                metered_complete(self.llm.as_ref(), &messages, CallKind::Reasoning, &mut ctx.telemetry)
                    .await?;

            match parse_reasoning_output(&response.content) {
                Ok(ReasoningOutput::FinalAnswer { answer, .. }) => {
                    return Ok(finish(trace, answer, TerminationReason::FinalAnswer, iterations));
                }
                Ok(ReasoningOutput::Action { thought, call }) => {
                    parse_failures = 0;
                    let args = self.registry.normalize_input(&call.action, call.input);
                    let result = self.registry.invoke(&call.action, &args).await;
                    let mut observation = prompts::observation_prompt(&result.observation);
                    trace.push(call.action, args, result, thought);
                    if let (Some(reflector), Some(step)) = (&self.step_reflector, trace.last()) {
                        if !ctx.is_cancelled() {
                            if let Some(note) = reflector.reflect(task, step, ctx).await {
                                observation.push_str(&format!("\nReflection: {note}"));
                                ctx.reflections.push(note);
                            }
                        }
                    }
                    messages.push(Message::assistant(response.content));
                    messages.push(Message::user(observation));
                }
                Err(e) => {
                    parse_failures += 1;
                    tracing::warn!(attempt = parse_failures, error = %e, "unparseable model output");
                    if parse_failures > self.config.format_retries {
                        return Ok(finish(trace, String::new(), TerminationReason::ParseFailure, iterations));
                    }
                    match self.recovery.handle(&e) {
                        RecoveryAction::RetryWithPrompt(prompt) => {
                            messages.push(Message::assistant(response.content));
                            messages.push(Message::user(prompt));
                        }
                        RecoveryAction::Abort => {
                            return Ok(finish(trace, String::new(), TerminationReason::ParseFailure, iterations));
                        }
                    }
                }
            }
        }
    }
}
