//! 基准运行器：逐个任务执行
//!
//! 每个任务前重置环境（任务自带 world 时改为 apply），然后用全新的 RunContext 运行。
//! 共享世界不支持并发运行，所以这里严格串行。
//! 配置了扰动计划时，每个任务拿到自己的 Perturber：输入描述先被扰动，
//! agent 的模型调用与动作观察也经过它，结果里记录扰动情况，描述仍保留原文。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::{BenchAgent, TaskDescriptor, TaskResult};
use crate::bench::{perturb_agent, BenchReport, PerturbationPlan, TaskSuite};
use crate::world::Environment;

pub struct BenchRunner {
    agent: BenchAgent,
    environment: Option<Arc<dyn Environment>>,
    perturbation: Option<PerturbationPlan>,
    cancel_token: CancellationToken,
}

impl BenchRunner {
    pub fn new(agent: BenchAgent) -> Self {
        Self {
            agent,
            environment: None,
            perturbation: None,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// 未激活的计划等同于不扰动
    pub fn with_perturbation(mut self, plan: PerturbationPlan) -> Self {
        self.perturbation = plan.is_active().then_some(plan);
        self
    }

    /// 取消后当前任务协作式结束，剩余任务不再启动
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn agent(&self) -> &BenchAgent {
        &self.agent
    }

    fn prepare(&self, task: &TaskDescriptor) {
        let Some(env) = &self.environment else {
            return;
        };
        match &task.world {
            Some(state) => env.apply(state.clone()),
            None => env.reset(),
        }
        tracing::debug!(task = %task.id, world = %env.describe(), "environment prepared");
    }

    pub async fn run_task(&self, task: &TaskDescriptor) -> TaskResult {
        self.prepare(task);
        let Some(plan) = &self.perturbation else {
            return self.agent.run_with_cancel(task, self.cancel_token.child_token()).await;
        };

        let perturber = Arc::new(plan.perturber_for(&task.id));
        let perturbed = perturber.perturb_task(&task.description);
        // 类别按原文确定，扰动不应改变任务归类
        let input = TaskDescriptor {
            description: perturbed.clone(),
            category: Some(task.task_category().as_str().to_string()),
            ..task.clone()
        };
        tracing::debug!(task = %task.id, input = %perturbed, "task input perturbed");

        let agent = perturb_agent(&self.agent, Arc::clone(&perturber));
        let mut result = agent.run_with_cancel(&input, self.cancel_token.child_token()).await;
        result.description = task.description.clone();
        result.perturbation = Some(perturber.record(perturbed));
        result
    }

    pub async fn run_suite(&self, suite: &TaskSuite) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(suite.len());
        for (i, task) in suite.iter().enumerate() {
            if self.cancel_token.is_cancelled() {
                tracing::warn!(remaining = suite.len() - i, "benchmark cancelled, skipping remaining tasks");
                break;
            }
            tracing::info!(task = %task.id, progress = %format!("{}/{}", i + 1, suite.len()), "running task");
            results.push(self.run_task(task).await);
        }
        results
    }

    /// 运行整个任务集并生成报表
    pub async fn run_with_report(&self, suite: &TaskSuite) -> (Vec<TaskResult>, BenchReport) {
        let results = self.run_suite(suite).await;
        let report = BenchReport::from_results(&results);
        (results, report)
    }
}
