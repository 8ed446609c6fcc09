//! 可观测性：日志初始化、任务级遥测、模型调用计量

pub mod metered;
pub mod telemetry;

pub use metered::metered_complete;
pub use telemetry::{estimate_tokens, CallKind, CallMetric, TelemetryCollector, TelemetrySummary};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 日志：默认 info，可通过 RUST_LOG 覆盖
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
