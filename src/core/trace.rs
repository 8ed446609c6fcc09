//! 执行轨迹：按执行顺序追加的步骤，运行期间只追加不修改

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::actions::ActionResult;

/// 单个已执行步骤；index 从 1 开始
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub action_name: String,
    pub arguments: Map<String, Value>,
    pub result: ActionResult,
    /// 推理模型给出该动作前的思考（计划执行时为空）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    steps: Vec<Step>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加步骤并返回其引用；index 自动编号
    pub fn push(
        &mut self,
        action_name: impl Into<String>,
        arguments: Map<String, Value>,
        result: ActionResult,
        thought: Option<String>,
    ) -> &Step {
        let index = self.steps.len() + 1;
        self.steps.push(Step {
            index,
            action_name: action_name.into(),
            arguments,
            result,
            thought,
        });
        &self.steps[index - 1]
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn ok_count(&self) -> usize {
        self.steps.iter().filter(|s| s.result.ok).count()
    }

    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|s| s.result.ok)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| !s.result.ok)
    }

    /// 提示词用的历史摘要：`Step n: action(args) -> observation`
    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(|s| {
                format!(
                    "Step {}: {}({}) -> {}",
                    s.index,
                    s.action_name,
                    Value::Object(s.arguments.clone()),
                    s.result.observation
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_and_counts() {
        let mut t = Trace::new();
        t.push("go_to_place", Map::new(), ActionResult::ok("Success: arrived"), None);
        let step = t.push("find_person", Map::new(), ActionResult::fail("Failure: nobody"), None);
        assert_eq!(step.index, 2);
        assert_eq!(t.len(), 2);
        assert_eq!(t.ok_count(), 1);
        assert!(!t.all_ok());
        assert_eq!(t.failed_steps().count(), 1);
        assert!(t.render().contains("Step 2: find_person({}) -> Failure: nobody"));
    }
}
