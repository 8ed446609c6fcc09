//! 反思重试控制器（Reflexion）
//!
//! Act（推理循环）-> Evaluate -> 成功则结束；失败且仍有尝试次数则 Reflect 后再 Act；否则耗尽结束。
//! 首次成功立即停止；反思只在失败且还有剩余尝试时生成，因此 reflections == attempts - 1。
//! 取消后不再反思也不再开始新尝试，上面的等式同样成立。
//! 所有尝试共享同一个 RunContext：遥测与反思在整次运行内累计。

use serde::{Deserialize, Serialize};

use crate::config::EngineSection;
use crate::core::{RunContext, Trace};
use crate::react::loop_::{LoopOutcome, ReasoningLoop, TerminationReason};
use crate::react::reflector::{error_reflection, Reflector};

/// 单次尝试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub number: usize,
    pub trace: Trace,
    pub outcome: bool,
    pub final_output: String,
    /// 推理循环出错时为 None
    pub termination: Option<TerminationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 控制器结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryOutcome {
    pub success: bool,
    pub attempts: Vec<Attempt>,
    /// 因取消而提前结束
    #[serde(default)]
    pub cancelled: bool,
}

impl RetryOutcome {
    pub fn last(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn final_output(&self) -> &str {
        self.last().map(|a| a.final_output.as_str()).unwrap_or("")
    }

    /// 最后一次尝试的轨迹（成功时即成功的那次）
    pub fn last_trace(&self) -> Trace {
        self.last().map(|a| a.trace.clone()).unwrap_or_default()
    }
}

/// 尝试评估谓词：循环以最终答案结束、答案非空、不含致命标记；可选要求所有步骤 ok
#[derive(Debug, Clone)]
pub struct AttemptPredicate {
    pub fatal_markers: Vec<String>,
    pub require_all_steps_ok: bool,
}

impl AttemptPredicate {
    pub fn from_config(cfg: &EngineSection) -> Self {
        Self {
            fatal_markers: cfg.fatal_markers.iter().map(|m| m.to_lowercase()).collect(),
            require_all_steps_ok: cfg.require_all_steps_ok,
        }
    }

    pub fn evaluate(&self, outcome: &LoopOutcome) -> bool {
        if outcome.termination != TerminationReason::FinalAnswer {
            return false;
        }
        let answer = outcome.final_output.trim().to_lowercase();
        if answer.is_empty() {
            return false;
        }
        if self.fatal_markers.iter().any(|m| answer.contains(m.as_str())) {
            return false;
        }
        !self.require_all_steps_ok || outcome.trace.all_ok()
    }
}

impl Default for AttemptPredicate {
    fn default() -> Self {
        Self::from_config(&EngineSection::default())
    }
}

pub struct ReflectiveRetry {
    engine: ReasoningLoop,
    reflector: Reflector,
    predicate: AttemptPredicate,
    max_attempts: usize,
}

impl ReflectiveRetry {
    /// 反思调用默认使用与推理循环相同的模型
    pub fn new(engine: ReasoningLoop, max_attempts: usize) -> Self {
        let reflector = Reflector::new(engine.llm());
        Self {
            engine,
            reflector,
            predicate: AttemptPredicate::default(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_reflector(mut self, reflector: Reflector) -> Self {
        self.reflector = reflector;
        self
    }

    pub fn with_predicate(mut self, predicate: AttemptPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// 从不返回错误：循环出错按失败尝试记录，并以静态反思继续
    pub async fn run(&self, task: &str, ctx: &mut RunContext) -> RetryOutcome {
        ctx.reflections.clear();
        let mut attempts = Vec::new();

        for number in 1..=self.max_attempts {
            if ctx.is_cancelled() {
                tracing::info!(attempt = number, "run cancelled, no further attempts");
                break;
            }
            tracing::info!(attempt = number, max = self.max_attempts, "attempt started");
            let has_next = number < self.max_attempts;

            match self.engine.run(task, ctx).await {
                Ok(outcome) => {
                    let success = self.predicate.evaluate(&outcome);
                    tracing::info!(
                        attempt = number,
                        success,
                        termination = %outcome.termination,
                        steps = outcome.trace.len(),
                        "attempt evaluated"
                    );
                    let stopped = ctx.is_cancelled() || outcome.termination == TerminationReason::Cancelled;
                    if !success && has_next && !stopped {
                        let reflection = self.reflector.reflect(task, number, &outcome, ctx).await;
                        tracing::info!(attempt = number, reflection = %reflection, "reflection generated");
                        ctx.reflections.push(reflection);
                    }
                    attempts.push(Attempt {
                        number,
                        trace: outcome.trace,
                        outcome: success,
                        final_output: outcome.final_output,
                        termination: Some(outcome.termination),
                        error: None,
                    });
                    if success {
                        return RetryOutcome {
                            success: true,
                            attempts,
                            cancelled: false,
                        };
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt = number, error = %e, "attempt failed with error");
                    if has_next && !ctx.is_cancelled() {
                        ctx.reflections.push(error_reflection(number, &e.to_string()));
                    }
                    attempts.push(Attempt {
                        number,
                        trace: Trace::new(),
                        outcome: false,
                        final_output: String::new(),
                        termination: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let cancelled = ctx.is_cancelled();
        if cancelled {
            tracing::info!(attempts = attempts.len(), "run cancelled");
        } else {
            tracing::info!(attempts = attempts.len(), "all attempts exhausted");
        }
        RetryOutcome {
            success: false,
            attempts,
            cancelled,
        }
    }
}
