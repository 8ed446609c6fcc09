//! 先规划后执行策略：计划数据、中止策略、执行器

pub mod executor;
pub mod types;

pub use executor::{PlanAndExecute, PlanOutcome};
pub use types::{parse_plan, AbortPolicy, Plan, PlannedStep};
