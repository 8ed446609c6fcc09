//! Plan-and-Execute 策略
//!
//! 阶段 1：一次模型调用得到完整计划；阶段 2：按顺序经注册表执行。
//! 某步失败时，除非其 observation 属于「信息性失败」，否则立即中止。
//! 成功条件：计划非空、执行步数等于计划长度、每步 ok 或信息性失败，且最后一步 ok
//! （最后一步只是带回线索而没有完成目标时仍算失败）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::actions::ActionRegistry;
use crate::core::{AgentError, RunContext, Trace};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::observability::{metered_complete, CallKind};
use crate::plan::{parse_plan, AbortPolicy, Plan};
use crate::react::prompts;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub trace: Trace,
    pub success: bool,
    /// 中止时所在步骤（从 1 开始）
    pub aborted_at: Option<usize>,
    pub final_output: String,
}

pub struct PlanAndExecute {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ActionRegistry>,
    policy: AbortPolicy,
    system_prompt: String,
}

impl PlanAndExecute {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ActionRegistry>, policy: AbortPolicy) -> Self {
        let system_prompt = prompts::planning_system_prompt(&registry.describe());
        Self {
            llm,
            registry,
            policy,
            system_prompt,
        }
    }

    /// 计划阶段：一次计量调用 + 解析
    pub async fn make_plan(&self, task: &str, ctx: &mut RunContext) -> Result<Plan, AgentError> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(prompts::planning_user_prompt(task)),
        ];
        let (response, _) =
            metered_complete(self.llm.as_ref(), &messages, CallKind::Planning, &mut ctx.telemetry).await?;
        let plan = parse_plan(&response.content)?;
        tracing::info!(steps = plan.len(), "plan generated");
        for (i, step) in plan.steps.iter().enumerate() {
            tracing::debug!(step = i + 1, action = %step.action, args = %step.args, "planned step");
        }
        Ok(plan)
    }

    /// 执行阶段：按顺序执行，按中止策略决定是否继续
    pub async fn execute(&self, plan: Plan, ctx: &RunContext) -> PlanOutcome {
        let mut trace = Trace::new();
        let mut aborted_at = None;

        for (i, step) in plan.steps.iter().enumerate() {
            if ctx.is_cancelled() {
                tracing::info!(step = i + 1, "plan execution cancelled");
                aborted_at = Some(i + 1);
                break;
            }
            let args = self.registry.normalize_input(&step.action, step.args.clone());
            let result = self.registry.invoke(&step.action, &args).await;
            let proceed = self.policy.should_continue(&result);
            if !result.ok && proceed {
                tracing::info!(step = i + 1, observation = %result.observation, "informative failure, continuing");
            }
            trace.push(step.action.clone(), args, result, None);
            if !proceed {
                tracing::info!(step = i + 1, total = plan.len(), "plan aborted");
                aborted_at = Some(i + 1);
                break;
            }
        }

        let success = self.is_success(&plan, &trace);
        let final_output = summarize(&plan, &trace, success, aborted_at);
        PlanOutcome {
            plan,
            trace,
            success,
            aborted_at,
            final_output,
        }
    }

    fn is_success(&self, plan: &Plan, trace: &Trace) -> bool {
        !plan.is_empty()
            && trace.len() == plan.len()
            && trace.last().map(|s| s.result.ok).unwrap_or(false)
            && trace
                .steps()
                .iter()
                .all(|s| s.result.ok || self.policy.is_informative(&s.result.observation))
    }

    pub async fn run(&self, task: &str, ctx: &mut RunContext) -> Result<PlanOutcome, AgentError> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let plan = self.make_plan(task, ctx).await?;
        Ok(self.execute(plan, ctx).await)
    }
}

fn summarize(plan: &Plan, trace: &Trace, success: bool, aborted_at: Option<usize>) -> String {
    let last = trace.last().map(|s| s.result.observation.as_str()).unwrap_or("");
    if plan.is_empty() {
        "The plan was empty, no action was taken.".to_string()
    } else if success {
        format!("Task completed: executed {} of {} planned steps. {}", trace.len(), plan.len(), last)
    } else if let Some(step) = aborted_at {
        format!("Plan failed at step {} of {}: {}", step, plan.len(), last)
    } else {
        format!(
            "Plan finished without reaching the goal after {} steps: {}",
            trace.len(),
            last
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionResult, ActionSpec, ArgType, ResponseShape};
    use crate::config::PlanSection;
    use crate::llm::MockLlmClient;

    fn registry() -> Arc<ActionRegistry> {
        let mut reg = ActionRegistry::new();
        reg.register_fn(
            ActionSpec::new("go_to_place", "").required("location", ArgType::Str),
            |_| Ok(ResponseShape::Flag(true)),
        )
        .register_fn(ActionSpec::new("find_person", "").required("name", ArgType::Str), |_| {
            Ok(ResponseShape::Shaped(ActionResult::fail("Tomas is in the living room")))
        })
        .register_fn(ActionSpec::new("open_door", ""), |_| {
            Ok(ResponseShape::Shaped(ActionResult::fail("the door is locked")))
        })
        .register_fn(ActionSpec::new("talk", "").required("text", ArgType::Str), |_| {
            Ok(ResponseShape::Flag(true))
        });
        Arc::new(reg)
    }

    fn strategy(plan_json: &str) -> (Arc<MockLlmClient>, PlanAndExecute) {
        let mock = Arc::new(MockLlmClient::scripted([plan_json]));
        let policy = AbortPolicy::from_patterns(&PlanSection::default().informative_failure_patterns).unwrap();
        let s = PlanAndExecute::new(mock.clone(), registry(), policy);
        (mock, s)
    }

    #[tokio::test]
    async fn test_single_step_success() {
        let (_, s) = strategy(r#"{"steps": [{"action": "go_to_place", "args": {"location": "kitchen"}}]}"#);
        let mut ctx = RunContext::new();
        let out = s.run("go to the kitchen", &mut ctx).await.unwrap();
        assert!(out.success);
        assert_eq!(out.trace.len(), 1);
        assert!(out.final_output.starts_with("Task completed"));
        assert_eq!(ctx.telemetry.summary().detail[0].kind, CallKind::Planning);
    }

    #[tokio::test]
    async fn test_dead_end_aborts() {
        let (_, s) = strategy(
            r#"{"steps": [{"action": "go_to_place", "args": {"location": "hall"}},
                          {"action": "open_door", "args": {}},
                          {"action": "talk", "args": {"text": "hi"}}]}"#,
        );
        let mut ctx = RunContext::new();
        let out = s.run("t", &mut ctx).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.trace.len(), 2);
        assert_eq!(out.aborted_at, Some(2));
    }

    #[tokio::test]
    async fn test_informative_failure_continues() {
        let (_, s) = strategy(
            r#"[{"action": "find_person", "args": {"name": "Tomas"}},
               {"action": "talk", "args": {"text": "hello"}}]"#,
        );
        let mut ctx = RunContext::new();
        let out = s.run("t", &mut ctx).await.unwrap();
        assert_eq!(out.trace.len(), 2);
        assert!(out.success);
        assert_eq!(out.aborted_at, None);
    }

    #[tokio::test]
    async fn test_informative_last_step_is_not_success() {
        let (_, s) = strategy(
            r#"[{"action": "go_to_place", "args": {"location": "kitchen"}},
               {"action": "find_person", "args": {"name": "Tomas"}}]"#,
        );
        let mut ctx = RunContext::new();
        let out = s.run("find Tomas", &mut ctx).await.unwrap();
        assert_eq!(out.trace.len(), 2);
        assert!(!out.success);
        assert!(out.final_output.starts_with("Plan finished without reaching the goal"));
    }

    #[tokio::test]
    async fn test_empty_and_invalid_plans() {
        let (_, s) = strategy(r#"{"steps": []}"#);
        let mut ctx = RunContext::new();
        let out = s.run("t", &mut ctx).await.unwrap();
        assert!(!out.success);
        assert!(out.trace.is_empty());

        let (_, s) = strategy("I refuse to plan");
        let err = s.run("t", &mut RunContext::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::PlanError(_)));
    }
}
