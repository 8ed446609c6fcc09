//! 基准 Agent 运行时
//!
//! 按所选策略（ReAct / Plan-and-Execute / Reflexion / Reference）执行单个任务，产出 TaskResult。
//! 每次 run 创建独立的 RunContext，遥测与反思不会跨任务泄漏。
//! `run` 从不返回错误也不会把 panic 传给调用方：任何逃逸的错误都折叠为 success=false 的结果。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::actions::{ActionRegistry, ActionResult};
use crate::bench::PerturbationRecord;
use crate::config::{AppConfig, EngineSection, PlanSection};
use crate::core::{AgentError, RunContext, Trace};
use crate::evaluation::{classify_task, ResultCategory, ResultClassifier, TaskCategory};
use crate::llm::LlmClient;
use crate::observability::TelemetrySummary;
use crate::plan::{AbortPolicy, PlanAndExecute};
use crate::react::{
    Attempt, AttemptPredicate, ExampleBank, LoopConfig, LoopOutcome, ReasoningLoop,
    ReferencePredicate, ReflectiveRetry, StepReflector, TerminationReason,
};
use crate::world::WorldState;

/// 执行策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    React,
    Plan,
    Reflexion,
    /// ReAct + 示例检索 + 每步简短反思
    Reference,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::React => "react",
            Strategy::Plan => "plan",
            Strategy::Reflexion => "reflexion",
            Strategy::Reference => "reference",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "react" => Ok(Strategy::React),
            "plan" | "plan_execute" | "plan-and-execute" => Ok(Strategy::Plan),
            "reflexion" => Ok(Strategy::Reflexion),
            "reference" => Ok(Strategy::Reference),
            other => Err(AgentError::ConfigError(format!("unknown strategy: {other}"))),
        }
    }
}

/// 任务描述；world 可为该任务指定初始世界状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<WorldState>,
}

impl TaskDescriptor {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            category: None,
            world: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_world(mut self, world: WorldState) -> Self {
        self.world = Some(world);
        self
    }

    /// 显式类别能解析时使用它，否则按描述关键词推断
    pub fn task_category(&self) -> TaskCategory {
        self.category
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or_else(|| classify_task(&self.description))
    }
}

/// 单个任务的最终产物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub description: String,
    pub task_category: TaskCategory,
    pub strategy: Strategy,
    pub success: bool,
    /// 结果分类器给出的细分类别
    pub category: ResultCategory,
    /// 实际执行的动作数；致命错误时 trace 里那条 "run" 记录只是说明，不计入
    pub steps: usize,
    pub trace: Trace,
    pub attempts: usize,
    pub reflections: Vec<String>,
    /// 秒
    pub execution_time: f64,
    pub metrics: TelemetrySummary,
    pub final_output: String,
    pub model: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all_attempts: Vec<Attempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 运行器施加了鲁棒性扰动时的记录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perturbation: Option<PerturbationRecord>,
}

/// 策略执行的中间结果
struct Execution {
    success: bool,
    trace: Trace,
    final_output: String,
    /// 实际开始的尝试数（Reflexion 被取消时可能为 0）
    attempt_count: usize,
    attempts: Vec<Attempt>,
    error: Option<String>,
}

impl Execution {
    fn single(success: bool, trace: Trace, final_output: String) -> Self {
        Self {
            success,
            trace,
            final_output,
            attempt_count: 1,
            attempts: Vec::new(),
            error: None,
        }
    }
}

/// 非最终答案结束时给出停止原因
fn closing_output(outcome: &mut LoopOutcome) -> String {
    if outcome.termination == TerminationReason::FinalAnswer {
        std::mem::take(&mut outcome.final_output)
    } else {
        format!("Agent stopped: {}", outcome.termination)
    }
}

/// 基准 Agent：LLM + 只读动作目录 + 策略配置；可克隆，克隆间共享 LLM 与注册表
#[derive(Clone)]
pub struct BenchAgent {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ActionRegistry>,
    strategy: Strategy,
    engine: EngineSection,
    abort_policy: AbortPolicy,
    classifier: ResultClassifier,
}

impl BenchAgent {
    /// 使用默认引擎预算、默认信息性失败模式与默认分类短语
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ActionRegistry>, strategy: Strategy) -> Self {
        Self {
            llm,
            registry,
            strategy,
            engine: EngineSection::default(),
            abort_policy: AbortPolicy::from_patterns(&PlanSection::default().informative_failure_patterns)
                .unwrap_or_default(),
            classifier: ResultClassifier::default(),
        }
    }

    /// 从应用配置构建；信息性失败正则无效时返回 ConfigError
    pub fn from_config(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ActionRegistry>,
        strategy: Strategy,
        cfg: &AppConfig,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            llm,
            registry,
            strategy,
            engine: cfg.engine.clone(),
            abort_policy: AbortPolicy::from_patterns(&cfg.plan.informative_failure_patterns)?,
            classifier: ResultClassifier::from_config(&cfg.classifier),
        })
    }

    pub fn with_engine(mut self, engine: EngineSection) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_abort_policy(mut self, policy: AbortPolicy) -> Self {
        self.abort_policy = policy;
        self
    }

    pub fn with_classifier(mut self, classifier: ResultClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ActionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn llm(&self) -> Arc<dyn LlmClient> {
        Arc::clone(&self.llm)
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub async fn run(&self, task: &TaskDescriptor) -> TaskResult {
        self.run_with_cancel(task, CancellationToken::new()).await
    }

    /// 在独立的 tokio 任务里执行，panic 也被收拢为失败结果
    pub async fn run_with_cancel(&self, task: &TaskDescriptor, cancel: CancellationToken) -> TaskResult {
        let agent = self.clone();
        let owned = task.clone();
        let handle = tokio::spawn(async move {
            let mut ctx = RunContext::with_cancel_token(cancel);
            agent.run_in_context(&owned, &mut ctx).await
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(task = %task.id, error = %e, "task run panicked");
                let ctx = RunContext::new();
                self.fatal_result(task, &ctx, &format!("task aborted: {e}"))
            }
        }
    }

    /// 在调用方提供的上下文里执行；错误折叠为失败结果
    pub async fn run_in_context(&self, task: &TaskDescriptor, ctx: &mut RunContext) -> TaskResult {
        tracing::info!(
            task = %task.id,
            strategy = %self.strategy,
            run_id = %ctx.run_id,
            "task started"
        );
        let result = match self.execute(&task.description, ctx).await {
            Ok(execution) => self.build_result(task, ctx, execution),
            Err(e) => {
                tracing::warn!(task = %task.id, error = %e, "task run failed");
                self.fatal_result(task, ctx, &e.to_string())
            }
        };
        tracing::info!(
            task = %task.id,
            success = result.success,
            category = %result.category,
            steps = result.steps,
            attempts = result.attempts,
            llm_calls = result.metrics.call_count,
            execution_time = result.execution_time,
            "task finished"
        );
        result
    }

    async fn execute(&self, task: &str, ctx: &mut RunContext) -> Result<Execution, AgentError> {
        let loop_config = LoopConfig::from(&self.engine);
        match self.strategy {
            Strategy::React => {
                let engine = ReasoningLoop::new(self.llm.clone(), self.registry.clone(), loop_config);
                let mut outcome = engine.run(task, ctx).await?;
                let final_output = closing_output(&mut outcome);
                let classification = self.classifier.classify(&outcome.trace, &final_output);
                let success = outcome.termination == TerminationReason::FinalAnswer
                    && classification.success;
                Ok(Execution::single(success, outcome.trace, final_output))
            }
            Strategy::Plan => {
                let strategy = PlanAndExecute::new(
                    self.llm.clone(),
                    self.registry.clone(),
                    self.abort_policy.clone(),
                );
                let outcome = strategy.run(task, ctx).await?;
                Ok(Execution::single(outcome.success, outcome.trace, outcome.final_output))
            }
            Strategy::Reflexion => {
                let engine = ReasoningLoop::new(self.llm.clone(), self.registry.clone(), loop_config);
                let retry = ReflectiveRetry::new(engine, self.engine.max_attempts)
                    .with_predicate(AttemptPredicate::from_config(&self.engine));
                let outcome = retry.run(task, ctx).await;
                let (final_output, error) = if outcome.cancelled {
                    (
                        format!("Agent stopped: {}", TerminationReason::Cancelled),
                        Some(AgentError::Cancelled.to_string()),
                    )
                } else {
                    (outcome.final_output().to_string(), None)
                };
                Ok(Execution {
                    success: outcome.success,
                    trace: outcome.last_trace(),
                    final_output,
                    attempt_count: outcome.attempts.len(),
                    attempts: outcome.attempts,
                    error,
                })
            }
            Strategy::Reference => {
                let bank = ExampleBank::builtin();
                let examples = bank.retrieve(task, 3);
                tracing::debug!(examples = examples.len(), "examples retrieved");
                let engine = ReasoningLoop::new(self.llm.clone(), self.registry.clone(), loop_config)
                    .with_prompt_appendix(&ExampleBank::render(&examples))
                    .with_step_reflector(StepReflector::new(self.llm.clone()));
                let mut outcome = engine.run(task, ctx).await?;
                let success = ReferencePredicate::from_config(&self.engine).evaluate(&outcome);
                let final_output = closing_output(&mut outcome);
                Ok(Execution::single(success, outcome.trace, final_output))
            }
        }
    }

    fn build_result(&self, task: &TaskDescriptor, ctx: &RunContext, execution: Execution) -> TaskResult {
        let category = match execution.error {
            Some(_) => ResultCategory::Fail,
            None => {
                self.classifier
                    .classify(&execution.trace, &execution.final_output)
                    .category
            }
        };
        TaskResult {
            task_id: task.id.clone(),
            description: task.description.clone(),
            task_category: task.task_category(),
            strategy: self.strategy,
            success: execution.success,
            category,
            steps: execution.trace.len(),
            trace: execution.trace,
            attempts: execution.attempt_count,
            reflections: ctx.reflections.entries().to_vec(),
            execution_time: ctx.elapsed().as_secs_f64(),
            metrics: ctx.telemetry.summary(),
            final_output: execution.final_output,
            model: self.llm.model_name().to_string(),
            run_id: ctx.run_id,
            started_at: ctx.started_at,
            all_attempts: execution.attempts,
            error: execution.error,
            perturbation: None,
        }
    }

    /// 致命错误：trace 中一条 "run" 记录说明原因，steps 为 0（没有动作真正执行），指标尽量保留
    fn fatal_result(&self, task: &TaskDescriptor, ctx: &RunContext, error: &str) -> TaskResult {
        let observation = format!("Fatal error: {error}");
        let mut trace = Trace::new();
        trace.push("run", serde_json::Map::new(), ActionResult::fail(observation.clone()), None);
        TaskResult {
            task_id: task.id.clone(),
            description: task.description.clone(),
            task_category: task.task_category(),
            strategy: self.strategy,
            success: false,
            category: ResultCategory::Fail,
            steps: 0,
            trace,
            attempts: 1,
            reflections: ctx.reflections.entries().to_vec(),
            execution_time: ctx.elapsed().as_secs_f64(),
            metrics: ctx.telemetry.summary(),
            final_output: observation,
            model: self.llm.model_name().to_string(),
            run_id: ctx.run_id,
            started_at: ctx.started_at,
            all_attempts: Vec::new(),
            error: Some(error.to_string()),
            perturbation: None,
        }
    }
}
