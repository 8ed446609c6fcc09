//! 计划数据与中止策略
//!
//! 计划是模型一次性给出的有序 `{action, args}` 列表，视为不透明数据，只在执行时经过参数校验。

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::ActionResult;
use crate::core::AgentError;

/// 计划中的一步；兼容 tool_name / arguments 等常见字段名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    #[serde(alias = "tool_name", alias = "tool")]
    pub action: String,
    #[serde(default, alias = "arguments", alias = "action_input")]
    pub args: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlannedStep>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn extract_json(trimmed: &str) -> Option<&str> {
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let obj = trimmed.find('{');
    let arr = trimmed.find('[');
    let (start, close) = match (obj, arr) {
        (Some(o), Some(a)) if a < o => (a, ']'),
        (Some(o), _) => (o, '}'),
        (None, Some(a)) => (a, ']'),
        (None, None) => return None,
    };
    let end = trimmed.rfind(close)?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析计划：`{"steps": [...]}` 或直接的步骤数组，允许 ```json 围栏
pub fn parse_plan(output: &str) -> Result<Plan, AgentError> {
    let trimmed = output.trim();
    let json_str = extract_json(trimmed)
        .ok_or_else(|| AgentError::PlanError(format!("no JSON plan found in: {}", trimmed)))?;
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| AgentError::PlanError(format!("{}: {}", e, json_str)))?;
    let plan = match value {
        Value::Array(_) => Plan {
            steps: serde_json::from_value(value).map_err(|e| AgentError::PlanError(e.to_string()))?,
        },
        other => serde_json::from_value(other).map_err(|e| AgentError::PlanError(e.to_string()))?,
    };
    if plan.steps.iter().any(|s| s.action.trim().is_empty()) {
        return Err(AgentError::PlanError("plan step without action name".into()));
    }
    Ok(plan)
}

/// 中止策略：失败步骤的 observation 匹配任一「信息性失败」正则时继续执行，否则中止
#[derive(Debug, Clone, Default)]
pub struct AbortPolicy {
    informative: Vec<Regex>,
}

impl AbortPolicy {
    pub fn from_patterns(patterns: &[String]) -> Result<Self, AgentError> {
        let informative = patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| AgentError::ConfigError(format!("invalid informative pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { informative })
    }

    /// 从不继续的策略：任何失败都中止
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn is_informative(&self, observation: &str) -> bool {
        self.informative.iter().any(|re| re.is_match(observation))
    }

    /// 该步骤之后是否继续执行
    pub fn should_continue(&self, result: &ActionResult) -> bool {
        result.ok || self.is_informative(&result.observation)
    }
}
