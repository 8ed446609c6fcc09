//! Reference 策略的组件
//!
//! ReAct 循环之上叠加两样东西：开跑前从示例库检索相似的已解任务放进 system prompt；
//! 每个动作步骤之后做一次简短反思（StepReflector，由 ReasoningLoop 调用）。
//! 判定成功看收尾：以最终答案结束、无致命标记，且最近至多 3 步里过半成功。

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineSection;
use crate::core::{RunContext, Step};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::observability::{metered_complete, CallKind};
use crate::react::loop_::{LoopOutcome, TerminationReason};
use crate::react::prompts;

/// 已解任务示例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolvedExample {
    pub task: String,
    pub solution: Vec<String>,
    pub lesson: String,
}

impl SolvedExample {
    pub fn new(task: &str, solution: &[&str], lesson: &str) -> Self {
        Self {
            task: task.to_string(),
            solution: solution.iter().map(|s| s.to_string()).collect(),
            lesson: lesson.to_string(),
        }
    }
}

/// 内存示例库，按与任务描述的词重叠度排序检索
#[derive(Debug, Clone, Default)]
pub struct ExampleBank {
    examples: Vec<SolvedExample>,
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

impl ExampleBank {
    pub fn new(examples: Vec<SolvedExample>) -> Self {
        Self { examples }
    }

    /// 家居场景的三条基础示例
    pub fn builtin() -> Self {
        Self::new(vec![
            SolvedExample::new(
                "Go to the kitchen, find Tomas and give him a message",
                &[
                    "Step 1: go_to_place(kitchen) - navigate to the location first",
                    "Step 2: find_person(Tomas) - look for the specific person",
                    "Step 3: talk(message) - deliver the message",
                ],
                "Right order: location first, then the person, then the communication.",
            ),
            SolvedExample::new(
                "Find a person and then go to a place",
                &[
                    "Step 1: find_person(name) - locate the person first",
                    "Step 2: go_to_place(place) - navigate to the requested place",
                ],
                "Flexible order: you may look for the person first when needed.",
            ),
            SolvedExample::new(
                "A task that needs a location that is not available",
                &[
                    "Step 1: try go_to_place(location)",
                    "Observation: location not found",
                    "Step 2: talk(explanation) - tell the user about the limitation",
                ],
                "When a capability is missing, say so clearly to the user.",
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// 重叠度降序，同分保持原有顺序
    pub fn retrieve(&self, task: &str, limit: usize) -> Vec<&SolvedExample> {
        let query = words(task);
        let mut scored: Vec<(usize, &SolvedExample)> = self
            .examples
            .iter()
            .map(|e| (words(&e.task).intersection(&query).count(), e))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, e)| e).collect()
    }

    /// 拼入 system prompt 的示例段落；无示例时为空串
    pub fn render(examples: &[&SolvedExample]) -> String {
        if examples.is_empty() {
            return String::new();
        }
        let mut out = String::from("--- RELEVANT EXAMPLES ---\n");
        for (i, e) in examples.iter().enumerate() {
            out.push_str(&format!("\nExample {}:\nTask: {}\nSolution:\n", i + 1, e.task));
            for step in &e.solution {
                out.push_str(&format!("  {step}\n"));
            }
            out.push_str(&format!("Lesson: {}\n", e.lesson));
        }
        out.push_str("--- END EXAMPLES ---\n");
        out
    }
}

/// 每步之后的一句话反思；调用失败或空白时不产生反思
pub struct StepReflector {
    llm: Arc<dyn LlmClient>,
}

impl StepReflector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn reflect(&self, task: &str, step: &Step, ctx: &mut RunContext) -> Option<String> {
        let call = format!(
            "{}({})",
            step.action_name,
            Value::Object(step.arguments.clone())
        );
        let prompt = prompts::step_reflection_prompt(task, step.index, &call, &step.result.observation);
        let messages = vec![Message::user(prompt)];
        match metered_complete(self.llm.as_ref(), &messages, CallKind::StepReflection, &mut ctx.telemetry).await {
            Ok((response, _)) => {
                let text = response.content.trim();
                let text = text.strip_prefix("REFLECTION:").unwrap_or(text).trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(e) => {
                tracing::warn!(step = step.index, error = %e, "step reflection failed, skipping");
                None
            }
        }
    }
}

/// Reference 策略的成功判定
#[derive(Debug, Clone)]
pub struct ReferencePredicate {
    pub fatal_markers: Vec<String>,
    /// 收尾窗口大小
    pub window: usize,
}

impl ReferencePredicate {
    pub fn from_config(cfg: &EngineSection) -> Self {
        Self {
            fatal_markers: cfg.fatal_markers.iter().map(|m| m.to_lowercase()).collect(),
            window: 3,
        }
    }

    pub fn evaluate(&self, outcome: &LoopOutcome) -> bool {
        if outcome.termination != TerminationReason::FinalAnswer || outcome.trace.is_empty() {
            return false;
        }
        let answer = outcome.final_output.trim().to_lowercase();
        if answer.is_empty() || self.fatal_markers.iter().any(|m| answer.contains(m.as_str())) {
            return false;
        }
        let steps = outcome.trace.steps();
        let tail = &steps[steps.len().saturating_sub(self.window.max(1))..];
        let ok = tail.iter().filter(|s| s.result.ok).count();
        ok >= tail.len() / 2 + 1
    }
}

impl Default for ReferencePredicate {
    fn default() -> Self {
        Self::from_config(&EngineSection::default())
    }
}
