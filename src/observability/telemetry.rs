//! 遥测收集器：每次模型调用的 token 与延迟
//!
//! 每个任务运行独立实例（挂在 RunContext 上）；复用会导致跨任务统计污染。
//! 后端未返回 usage 时按「字符数 / 4」估算 token。

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::llm::LlmResponse;
use crate::memory::message::total_chars;
use crate::memory::Message;

/// 模型调用的用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Reasoning,
    Planning,
    Reflection,
    /// 每步之后的简短反思
    StepReflection,
}

/// 单次模型调用的度量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMetric {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_seconds: f64,
    /// Unix 时间戳（秒）
    pub timestamp: f64,
    pub kind: CallKind,
    pub model: String,
}

impl CallMetric {
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

/// 汇总指标
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    pub call_count: usize,
    pub total_tokens: u64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    pub total_latency: f64,
    pub avg_tokens_per_call: f64,
    pub avg_latency_per_call: f64,
    /// 重新规划次数（当前策略均不重新规划，恒为 0，保留给报表）
    pub replannings: usize,
    pub detail: Vec<CallMetric>,
}

/// 按字符数估算 token：约 4 字符 1 token，非空文本至少 1
pub fn estimate_tokens(chars: usize) -> u64 {
    if chars == 0 {
        0
    } else {
        ((chars / 4) as u64).max(1)
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Debug)]
struct PendingCall {
    started: Instant,
    estimated_prompt_tokens: u64,
}

/// 收集器：on_call_start / on_call_end 成对调用；调用失败时不记录
#[derive(Debug, Default)]
pub struct TelemetryCollector {
    calls: Vec<CallMetric>,
    pending: Option<PendingCall>,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录开始时间，并按 prompt 长度预估输入 token
    pub fn on_call_start(&mut self, prompt: &[Message]) {
        self.pending = Some(PendingCall {
            started: Instant::now(),
            estimated_prompt_tokens: estimate_tokens(total_chars(prompt)),
        });
    }

    /// 计算延迟、提取或估算 token，追加一条 CallMetric 并返回
    pub fn on_call_end(&mut self, response: &LlmResponse, kind: CallKind, model: &str) -> CallMetric {
        let (latency, estimated_in) = match self.pending.take() {
            Some(p) => (p.started.elapsed().as_secs_f64(), p.estimated_prompt_tokens),
            None => (0.0, 0),
        };

        let (mut tokens_in, mut tokens_out) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));
        if tokens_out == 0 {
            tokens_out = estimate_tokens(response.content.chars().count());
        }
        if tokens_in == 0 {
            tokens_in = estimated_in;
        }

        let metric = CallMetric {
            tokens_in,
            tokens_out,
            latency_seconds: latency,
            timestamp: unix_now(),
            kind,
            model: model.to_string(),
        };
        self.calls.push(metric.clone());
        metric
    }

    /// 丢弃未完成的调用（调用出错时使用）
    pub fn on_call_error(&mut self) {
        self.pending = None;
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn summary(&self) -> TelemetrySummary {
        let call_count = self.calls.len();
        let total_tokens_in: u64 = self.calls.iter().map(|c| c.tokens_in).sum();
        let total_tokens_out: u64 = self.calls.iter().map(|c| c.tokens_out).sum();
        let total_tokens = total_tokens_in + total_tokens_out;
        let total_latency: f64 = self.calls.iter().map(|c| c.latency_seconds).sum();
        let (avg_tokens_per_call, avg_latency_per_call) = if call_count > 0 {
            (
                total_tokens as f64 / call_count as f64,
                total_latency / call_count as f64,
            )
        } else {
            (0.0, 0.0)
        };

        TelemetrySummary {
            call_count,
            total_tokens,
            total_tokens_in,
            total_tokens_out,
            total_latency,
            avg_tokens_per_call,
            avg_latency_per_call,
            replannings: 0,
            detail: self.calls.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(3), 1);
        assert_eq!(estimate_tokens(40), 10);
    }

    #[test]
    fn test_usage_preferred_over_estimate() {
        let mut t = TelemetryCollector::new();
        t.on_call_start(&[Message::user("x".repeat(400))]);
        let m = t.on_call_end(&LlmResponse::text("abcd").with_usage(7, 3), CallKind::Reasoning, "m");
        assert_eq!((m.tokens_in, m.tokens_out), (7, 3));
    }

    #[test]
    fn test_estimate_when_usage_missing() {
        let mut t = TelemetryCollector::new();
        t.on_call_start(&[Message::user("x".repeat(400))]);
        let m = t.on_call_end(&LlmResponse::text("y".repeat(80)), CallKind::Planning, "m");
        assert_eq!(m.tokens_in, 100);
        assert_eq!(m.tokens_out, 20);
        assert!(m.latency_seconds >= 0.0);
    }

    #[test]
    fn test_summary_averages() {
        let mut t = TelemetryCollector::new();
        for _ in 0..2 {
            t.on_call_start(&[]);
            t.on_call_end(&LlmResponse::text("").with_usage(10, 10), CallKind::Reasoning, "m");
        }
        let s = t.summary();
        assert_eq!(s.call_count, 2);
        assert_eq!(s.total_tokens, 40);
        assert!((s.avg_tokens_per_call - 20.0).abs() < 1e-9);
        assert_eq!(s.detail.len(), 2);
    }

    #[test]
    fn test_error_records_nothing() {
        let mut t = TelemetryCollector::new();
        t.on_call_start(&[Message::user("hi")]);
        t.on_call_error();
        assert_eq!(t.summary().call_count, 0);
        assert_eq!(t.summary().avg_latency_per_call, 0.0);
    }
}
