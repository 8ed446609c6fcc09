//! benchbot - 机器人任务执行策略基准
//!
//! 模块划分：
//! - **actions**: 动作规格、响应形态归一化、动作注册表、模拟机器人动作目录
//! - **agent**: 单任务运行时（ReAct / Plan-and-Execute / Reflexion / Reference）与 TaskResult
//! - **bench**: 任务集、串行基准运行器、鲁棒性扰动、汇总报表
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、执行轨迹、任务级运行上下文
//! - **evaluation**: 结果分类器与任务分类法
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容（含 DeepSeek 预设）/ Mock）
//! - **memory**: 对话消息与反思记忆
//! - **observability**: 日志初始化、遥测、模型调用计量
//! - **plan**: 先规划后执行策略
//! - **react**: 推理循环、失败反思、反思重试控制器、示例检索与逐步反思
//! - **world**: 世界状态与环境协作方

pub mod actions;
pub mod agent;
pub mod bench;
pub mod config;
pub mod core;
pub mod evaluation;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod react;
pub mod world;

pub use agent::{BenchAgent, Strategy, TaskDescriptor, TaskResult};
pub use bench::{BenchReport, BenchRunner, TaskSuite};
