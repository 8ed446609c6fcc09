//! 单次任务运行的上下文
//!
//! 每个任务运行独占一份 RunContext（遥测收集器 + 反思记忆 + 取消令牌），
//! 通过 `&mut` 在推理循环、计划执行器、重试控制器之间传递；不同任务之间绝不共享。

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::memory::ReflectionMemory;
use crate::observability::TelemetryCollector;

/// 任务级上下文：run_id、起始时间、遥测、反思记忆、取消令牌
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub telemetry: TelemetryCollector,
    pub reflections: ReflectionMemory,
    cancel_token: CancellationToken,
    clock: Instant,
}

impl RunContext {
    pub fn new() -> Self {
        Self::with_cancel_token(CancellationToken::new())
    }

    /// 使用外部取消令牌（由调用方协作式取消）
    pub fn with_cancel_token(cancel_token: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            telemetry: TelemetryCollector::new(),
            reflections: ReflectionMemory::new(),
            cancel_token,
            clock: Instant::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 自任务开始以来的耗时
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
