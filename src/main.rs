//! benchbot 命令行入口
//!
//! 用法：`benchbot <tasks-file> [-s react|plan|reflexion|reference] [-c path] [--perturbation level]`
//! 在模拟世界上串行运行任务集，最后把报表与逐任务结果以 JSON 打印到 stdout（日志走 stderr）。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use benchbot::{
    actions::simulated_catalogue,
    bench::{PerturbationKind, PerturbationLevel, PerturbationPlan},
    config::{load_config, PerturbationSection},
    llm::create_llm_from_config,
    observability,
    world::SimulatedWorld,
    BenchAgent, BenchRunner, Strategy, TaskSuite,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;

/// 机器人任务执行策略基准
#[derive(Parser, Debug)]
#[command(name = "benchbot")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 任务集文件（JSON 或 TOML）
    #[arg(value_name = "TASKS")]
    tasks: PathBuf,

    /// 执行策略：react / plan / reflexion / reference
    #[arg(short, long, default_value = "react")]
    strategy: Strategy,

    /// 额外的配置文件，覆盖 config/default.toml
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 扰动等级：baseline / mild / moderate / severe（覆盖 [perturbation] level）
    #[arg(long, value_name = "LEVEL")]
    perturbation: Option<PerturbationLevel>,

    /// 任务文本扰动，逗号分隔：distractors,noise,ambiguity,incomplete
    #[arg(long, value_name = "KINDS", value_delimiter = ',')]
    perturbation_types: Vec<PerturbationKind>,

    /// 扰动随机种子，设置后结果可复现
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    /// 配置文件中的扰动段，再叠加命令行覆盖
    fn perturbation_plan(&self, section: &PerturbationSection) -> anyhow::Result<PerturbationPlan> {
        let mut plan =
            PerturbationPlan::from_section(section).context("Invalid [perturbation] config")?;
        if let Some(level) = self.perturbation {
            plan.config = level.config();
        }
        if !self.perturbation_types.is_empty() {
            plan.kinds = self.perturbation_types.clone();
        }
        if self.seed.is_some() {
            plan.seed = self.seed;
        }
        Ok(plan)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let suite = TaskSuite::load(&cli.tasks)
        .with_context(|| format!("Failed to load tasks from {}", cli.tasks.display()))?;
    let llm = create_llm_from_config(&cfg.llm).context("Failed to create LLM client")?;
    let plan = cli.perturbation_plan(&cfg.perturbation)?;

    let world = Arc::new(SimulatedWorld::default());
    let registry = Arc::new(simulated_catalogue(world.clone(), cfg.engine.action_timeout_secs));
    let agent = BenchAgent::from_config(llm, registry, cli.strategy, &cfg)
        .context("Failed to build agent")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("Received Ctrl+C, cancelling benchmark...");
            on_signal.cancel();
        }
    });

    tracing::info!(
        tasks = suite.len(),
        strategy = %cli.strategy,
        suite = suite.name.as_deref().unwrap_or("-"),
        perturbed = plan.is_active(),
        "benchmark started"
    );
    let runner = BenchRunner::new(agent)
        .with_environment(world)
        .with_perturbation(plan)
        .with_cancel_token(cancel);
    let (results, report) = runner.run_with_report(&suite).await;
    tracing::info!(
        total = report.total_tasks,
        success_rate = report.success_rate,
        "benchmark finished"
    );

    let output = serde_json::json!({
        "strategy": cli.strategy,
        "suite": suite.name,
        "report": report,
        "results": results,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize results")?
    );
    Ok(())
}
