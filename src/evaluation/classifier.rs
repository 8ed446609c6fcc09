//! 任务结果分类
//!
//! 判定顺序：能力缺口短语 -> 成功短语且至少一步 ok -> 部分步骤 ok -> 全部步骤 ok ->
//! 致命短语 -> 非平凡输出算 partial，否则 fail。
//! 步骤是否成功只看 `ActionResult.ok`，不再解析 observation 里的标记。

use serde::{Deserialize, Serialize};

use crate::config::ClassifierSection;
use crate::core::Trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCategory {
    Success,
    Partial,
    Fail,
    /// 机器人明确说明自己做不到（如未知地点），视为成功
    CapabilityGap,
}

impl ResultCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Fail => "fail",
            Self::CapabilityGap => "capability_gap",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::CapabilityGap)
    }
}

impl std::fmt::Display for ResultCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ResultCategory,
    pub success: bool,
}

impl From<ResultCategory> for Classification {
    fn from(category: ResultCategory) -> Self {
        Self {
            category,
            success: category.is_success(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultClassifier {
    capability_gap: Vec<String>,
    success: Vec<String>,
    fatal: Vec<String>,
    min_output_chars: usize,
}

fn lowered(phrases: &[String]) -> Vec<String> {
    phrases.iter().map(|p| p.to_lowercase()).collect()
}

fn contains_any(text: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| !p.is_empty() && text.contains(p.as_str()))
}

impl ResultClassifier {
    pub fn from_config(cfg: &ClassifierSection) -> Self {
        Self {
            capability_gap: lowered(&cfg.capability_gap_phrases),
            success: lowered(&cfg.success_phrases),
            fatal: lowered(&cfg.fatal_phrases),
            min_output_chars: cfg.min_informative_output_chars,
        }
    }

    pub fn classify(&self, trace: &Trace, final_output: &str) -> Classification {
        self.category(trace, final_output).into()
    }

    fn category(&self, trace: &Trace, final_output: &str) -> ResultCategory {
        let text = final_output.trim().to_lowercase();
        let ok = trace.ok_count();
        let total = trace.len();

        if contains_any(&text, &self.capability_gap) {
            return ResultCategory::CapabilityGap;
        }
        if contains_any(&text, &self.success) && ok > 0 {
            return ResultCategory::Success;
        }
        if ok > 0 && ok < total {
            return ResultCategory::Partial;
        }
        if total > 0 && ok == total {
            return ResultCategory::Success;
        }
        if contains_any(&text, &self.fatal) {
            return ResultCategory::Fail;
        }
        if text.chars().count() > self.min_output_chars {
            ResultCategory::Partial
        } else {
            ResultCategory::Fail
        }
    }
}

impl Default for ResultClassifier {
    fn default() -> Self {
        Self::from_config(&ClassifierSection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionResult;
    use serde_json::Map;

    fn trace(oks: &[bool]) -> Trace {
        let mut t = Trace::new();
        for (i, ok) in oks.iter().enumerate() {
            let result = if *ok {
                ActionResult::ok(format!("Success: step {}", i))
            } else {
                ActionResult::fail(format!("Failure: step {}", i))
            };
            t.push("go_to_place", Map::new(), result, None);
        }
        t
    }

    #[test]
    fn test_decision_order() {
        let c = ResultClassifier::default();

        let r = c.classify(&trace(&[false]), "I don't know where the bathroom is");
        assert_eq!(r.category, ResultCategory::CapabilityGap);
        assert!(r.success);

        let r = c.classify(&trace(&[false, true]), "I have found Tomas");
        assert_eq!(r.category, ResultCategory::Success);

        // 成功短语但没有任何 ok 步骤
        let r = c.classify(&trace(&[false, false]), "Task completed");
        assert_eq!(r.category, ResultCategory::Partial);
        assert!(!r.success);

        let r = c.classify(&trace(&[true, false, true]), "something");
        assert_eq!(r.category, ResultCategory::Partial);

        let r = c.classify(&trace(&[true, true]), "ok");
        assert_eq!(r.category, ResultCategory::Success);

        let r = c.classify(&trace(&[false]), "it failed");
        assert_eq!(r.category, ResultCategory::Fail);
    }

    #[test]
    fn test_default_on_output_length() {
        let c = ResultClassifier::default();
        assert_eq!(
            c.classify(&Trace::new(), "The robot wandered around a bit").category,
            ResultCategory::Partial
        );
        assert_eq!(c.classify(&Trace::new(), "hmm").category, ResultCategory::Fail);
        assert_eq!(c.classify(&Trace::new(), "").category, ResultCategory::Fail);
    }

    #[test]
    fn test_spanish_phrases_and_serde() {
        let c = ResultClassifier::default();
        assert_eq!(
            c.classify(&trace(&[true]), "He llegado a la cocina").category,
            ResultCategory::Success
        );
        assert_eq!(
            c.classify(&trace(&[false]), "No conozco ese lugar").category,
            ResultCategory::CapabilityGap
        );
        assert_eq!(
            serde_json::to_string(&ResultCategory::CapabilityGap).unwrap(),
            "\"capability_gap\""
        );
    }
}
