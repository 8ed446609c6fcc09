//! 评估：任务结果分类与任务分类法

pub mod classifier;
pub mod taxonomy;

pub use classifier::{Classification, ResultCategory, ResultClassifier};
pub use taxonomy::{classify_task, TaskCategory};
