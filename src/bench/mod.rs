//! 基准测试：任务集加载、串行运行器、鲁棒性扰动、汇总报表

pub mod perturbation;
pub mod report;
pub mod runner;
pub mod suite;

pub use perturbation::{
    perturb_agent, PerturbationConfig, PerturbationKind, PerturbationLevel, PerturbationPlan,
    PerturbationRecord, Perturber, PerturbedLlm,
};
pub use report::{estimate_cost, BenchReport, CostEstimate, EfficiencyMetrics};
pub use runner::BenchRunner;
pub use suite::TaskSuite;
