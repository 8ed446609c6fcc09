//! 任务分类法：按描述里的关键词把任务归入固定类别，用于报表分组

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    NavigationSimple,
    SearchInteraction,
    MultiHopReasoning,
    UncertaintyHandling,
    ObjectManipulation,
    UnknownLocation,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NavigationSimple => "navigation_simple",
            Self::SearchInteraction => "search_interaction",
            Self::MultiHopReasoning => "multi_hop_reasoning",
            Self::UncertaintyHandling => "uncertainty_handling",
            Self::ObjectManipulation => "object_manipulation",
            Self::UnknownLocation => "unknown_location",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "navigation_simple" => Ok(Self::NavigationSimple),
            "search_interaction" => Ok(Self::SearchInteraction),
            "multi_hop_reasoning" => Ok(Self::MultiHopReasoning),
            "uncertainty_handling" => Ok(Self::UncertaintyHandling),
            "object_manipulation" => Ok(Self::ObjectManipulation),
            "unknown_location" => Ok(Self::UnknownLocation),
            other => Err(format!("unknown task category: {}", other)),
        }
    }
}

const NAVIGATION: &[&str] = &["go to", "navigate to", "head to", "ve a", "navega a", "dirígete a"];
const UNKNOWN_PLACES: &[&str] = &["bathroom", "garden", "garage", "patio", "baño", "jardín"];
const SEARCH: &[&str] = &["find", "look for", "tell", "ask", "busca a", "dile", "pregunta"];
const MANIPULATION: &[&str] = &["pick up", "grab", "place", "put ", "toma", "agarra", "coloca"];
const UNCERTAINTY: &[&str] = &["if not", "in case", "try to", "verify", "check", "si no", "en caso de", "intenta", "verifica"];
const CONNECTORS: &[&str] = &[" and ", " then ", " after that ", " y ", " luego ", " después "];

fn has_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| text.contains(p))
}

/// 关键词优先级：导航 > 搜索/交互 > 物体操作 > 不确定性 > 多跳连接词；都不匹配时按简单导航处理
pub fn classify_task(description: &str) -> TaskCategory {
    let text = format!(" {} ", description.to_lowercase());

    if has_any(&text, NAVIGATION) {
        if has_any(&text, UNKNOWN_PLACES) {
            return TaskCategory::UnknownLocation;
        }
        return TaskCategory::NavigationSimple;
    }
    if has_any(&text, SEARCH) {
        if has_any(&text, CONNECTORS) {
            return TaskCategory::MultiHopReasoning;
        }
        return TaskCategory::SearchInteraction;
    }
    if has_any(&text, MANIPULATION) {
        return TaskCategory::ObjectManipulation;
    }
    if has_any(&text, UNCERTAINTY) {
        return TaskCategory::UncertaintyHandling;
    }
    if has_any(&text, CONNECTORS) {
        return TaskCategory::MultiHopReasoning;
    }
    TaskCategory::NavigationSimple
}
