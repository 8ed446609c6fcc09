//! Reflector：失败尝试的自我反思
//!
//! 用一次辅助模型调用把失败尝试（步骤、观察、最终输出）总结为 2-4 句反思，供下一次尝试参考。
//! 该调用同样计入当前运行的遥测（CallKind::Reflection）。模型调用失败或返回空白时退回静态反思。

use std::sync::Arc;

use crate::core::RunContext;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::observability::{metered_complete, CallKind};
use crate::react::loop_::LoopOutcome;
use crate::react::prompts;

pub struct Reflector {
    llm: Arc<dyn LlmClient>,
}

impl Reflector {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn reflect(
        &self,
        task: &str,
        attempt: usize,
        outcome: &LoopOutcome,
        ctx: &mut RunContext,
    ) -> String {
        let prompt = prompts::reflection_prompt(
            task,
            attempt,
            &outcome.trace,
            &outcome.final_output,
            outcome.termination.as_str(),
        );
        let messages = vec![Message::user(prompt)];
        match metered_complete(self.llm.as_ref(), &messages, CallKind::Reflection, &mut ctx.telemetry).await {
            Ok((response, _)) if !response.content.trim().is_empty() => {
                let text = response.content.trim();
                text.strip_prefix("REFLECTION:").unwrap_or(text).trim().to_string()
            }
            Ok(_) => fallback_reflection(attempt, outcome),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "reflection call failed, using fallback");
                fallback_reflection(attempt, outcome)
            }
        }
    }
}

/// 不依赖模型的反思：列出失败步骤与终止原因
pub fn fallback_reflection(attempt: usize, outcome: &LoopOutcome) -> String {
    let failed: Vec<String> = outcome
        .trace
        .failed_steps()
        .map(|s| format!("{} ({})", s.action_name, s.result.observation))
        .collect();
    let mut text = format!(
        "Attempt {} ended with {} after {} steps.",
        attempt,
        outcome.termination,
        outcome.trace.len()
    );
    if !failed.is_empty() {
        text.push_str(&format!(" Failed steps: {}.", failed.join("; ")));
    }
    text.push_str(" Next time use only listed actions with their exact arguments and follow the hints in the observations.");
    text
}

/// 尝试本身报错（如模型不可用）时的反思
pub fn error_reflection(attempt: usize, error: &str) -> String {
    format!(
        "Attempt {attempt} failed with error: {error}. Next time make sure to use the correct format and only the available actions."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionResult;
    use crate::core::Trace;
    use crate::llm::MockLlmClient;
    use crate::react::TerminationReason;
    use serde_json::Map;

    fn failed_outcome() -> LoopOutcome {
        let mut trace = Trace::new();
        trace.push("find_person", Map::new(), ActionResult::fail("Failure: nobody here"), None);
        LoopOutcome {
            trace,
            final_output: String::new(),
            termination: TerminationReason::BudgetExceeded,
            iterations: 3,
        }
    }

    #[tokio::test]
    async fn test_reflection_is_metered() {
        let mock = Arc::new(MockLlmClient::scripted(["REFLECTION: go to the living room first."]));
        let reflector = Reflector::new(mock.clone());
        let mut ctx = RunContext::new();
        let text = reflector.reflect("find Tomas", 1, &failed_outcome(), &mut ctx).await;
        assert_eq!(text, "go to the living room first.");
        let summary = ctx.telemetry.summary();
        assert_eq!(summary.call_count, 1);
        assert_eq!(summary.detail[0].kind, CallKind::Reflection);
        assert!(mock.prompts()[0][0].content.contains("[failed] find_person"));
    }

    #[tokio::test]
    async fn test_fallback_on_error() {
        let mock = MockLlmClient::new();
        mock.push_error("rate limited");
        let reflector = Reflector::new(Arc::new(mock));
        let mut ctx = RunContext::new();
        let text = reflector.reflect("find Tomas", 2, &failed_outcome(), &mut ctx).await;
        assert!(text.starts_with("Attempt 2 ended with budget exceeded after 1 steps."));
        assert!(text.contains("find_person (Failure: nobody here)"));
        assert_eq!(ctx.telemetry.summary().call_count, 0);
    }

    #[test]
    fn test_error_reflection() {
        assert!(error_reflection(1, "boom").starts_with("Attempt 1 failed with error: boom."));
    }
}
