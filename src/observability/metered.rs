//! 计量拦截器：包裹一次模型调用，测量耗时、提取 token，写入当前运行的收集器
//!
//! 调用出错时错误原样返回（映射为 AgentError::LlmError），不记录度量。

use crate::core::AgentError;
use crate::llm::{LlmClient, LlmResponse};
use crate::memory::Message;
use crate::observability::{CallKind, CallMetric, TelemetryCollector};

pub async fn metered_complete(
    llm: &dyn LlmClient,
    messages: &[Message],
    kind: CallKind,
    telemetry: &mut TelemetryCollector,
) -> Result<(LlmResponse, CallMetric), AgentError> {
    telemetry.on_call_start(messages);
    match llm.complete(messages).await {
        Ok(response) => {
            let metric = telemetry.on_call_end(&response, kind, llm.model_name());
            tracing::debug!(
                kind = ?kind,
                tokens_in = metric.tokens_in,
                tokens_out = metric.tokens_out,
                latency = metric.latency_seconds,
                "llm call"
            );
            Ok((response, metric))
        }
        Err(e) => {
            telemetry.on_call_error();
            tracing::warn!(kind = ?kind, error = %e, "llm call failed");
            Err(AgentError::LlmError(e))
        }
    }
}
