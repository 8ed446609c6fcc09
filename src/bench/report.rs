//! 基准报表：任务数、分类计数、成功率、平均开销与费用估算

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agent::TaskResult;
use crate::evaluation::{ResultCategory, TaskCategory};

/// 每百万 token 的综合单价（美元，输入输出取平均）；按子串匹配模型名，先匹配先用
const PRICING: &[(&str, f64)] = &[
    ("gpt-4o-mini", 0.30),
    ("gpt-4o", 7.50),
    ("gpt-4-turbo", 15.0),
    ("gpt-3.5-turbo", 1.0),
    ("deepseek", 0.70),
    ("qwen", 0.0),
    ("ollama", 0.0),
    ("mock", 0.0),
];

/// 按模型族估算费用；未知模型按 0 计
pub fn estimate_cost(total_tokens: u64, model: &str) -> f64 {
    let model = model.to_lowercase();
    let per_million = PRICING
        .iter()
        .find(|(key, _)| model.contains(key))
        .map(|(_, price)| *price)
        .unwrap_or(0.0);
    round_to(total_tokens as f64 / 1_000_000.0 * per_million, 6)
}

fn round_to(v: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (v * factor).round() / factor
}

fn avg(total: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        total / n as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub total_tokens: u64,
    pub avg_tokens_per_task: f64,
    pub total_execution_time: f64,
    pub avg_execution_time: f64,
    pub total_steps: usize,
    pub avg_steps_per_task: f64,
    pub total_attempts: usize,
    pub total_replannings: usize,
    pub total_llm_calls: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub total_usd: f64,
    pub per_task_usd: f64,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchReport {
    pub total_tasks: usize,
    pub successes: usize,
    /// 百分比，保留一位小数
    pub success_rate: f64,
    pub result_categories: BTreeMap<ResultCategory, usize>,
    /// 按任务类别的 (成功数, 总数)
    pub by_task_category: BTreeMap<TaskCategory, (usize, usize)>,
    pub efficiency: EfficiencyMetrics,
    pub cost_estimate: CostEstimate,
    /// 施加过扰动的任务数，以及它们累计被改动的输入与观察数
    #[serde(default)]
    pub perturbed_tasks: usize,
    #[serde(default)]
    pub perturbations_applied: usize,
}

impl BenchReport {
    pub fn from_results(results: &[TaskResult]) -> Self {
        let total = results.len();
        if total == 0 {
            return Self::default();
        }

        let mut result_categories = BTreeMap::new();
        let mut by_task_category: BTreeMap<TaskCategory, (usize, usize)> = BTreeMap::new();
        let mut efficiency = EfficiencyMetrics::default();
        let mut successes = 0;
        let mut perturbed_tasks = 0;
        let mut perturbations_applied = 0;

        for r in results {
            if let Some(p) = &r.perturbation {
                perturbed_tasks += 1;
                perturbations_applied += p.perturbations_applied;
            }
            *result_categories.entry(r.category).or_insert(0) += 1;
            let entry = by_task_category.entry(r.task_category).or_insert((0, 0));
            entry.1 += 1;
            if r.success {
                entry.0 += 1;
                successes += 1;
            }
            efficiency.total_tokens += r.metrics.total_tokens;
            efficiency.total_execution_time += r.execution_time;
            efficiency.total_steps += r.steps;
            efficiency.total_attempts += r.attempts;
            efficiency.total_replannings += r.metrics.replannings;
            efficiency.total_llm_calls += r.metrics.call_count;
        }

        efficiency.avg_tokens_per_task = round_to(avg(efficiency.total_tokens as f64, total), 1);
        efficiency.avg_execution_time = round_to(avg(efficiency.total_execution_time, total), 2);
        efficiency.total_execution_time = round_to(efficiency.total_execution_time, 2);
        efficiency.avg_steps_per_task = round_to(avg(efficiency.total_steps as f64, total), 1);

        let model = results[0].model.clone();
        let total_usd = estimate_cost(efficiency.total_tokens, &model);

        Self {
            total_tasks: total,
            successes,
            success_rate: round_to(successes as f64 / total as f64 * 100.0, 1),
            result_categories,
            by_task_category,
            efficiency,
            cost_estimate: CostEstimate {
                total_usd,
                per_task_usd: round_to(total_usd / total as f64, 6),
                model,
            },
            perturbed_tasks,
            perturbations_applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_estimate() {
        assert_eq!(estimate_cost(1_000_000, "gpt-4o-mini-2024"), 0.30);
        assert_eq!(estimate_cost(2_000_000, "GPT-4o"), 15.0);
        assert_eq!(estimate_cost(500, "mock"), 0.0);
        assert_eq!(estimate_cost(500, "some-local-model"), 0.0);
    }

    #[test]
    fn test_empty_report() {
        let report = BenchReport::from_results(&[]);
        assert_eq!(report.total_tasks, 0);
        assert_eq!(report.success_rate, 0.0);
    }
}
