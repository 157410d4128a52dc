use crate::clock::{Clock, SystemClock};
use crate::context::Context;
use crate::deadletter::{DeadLetterRecord, DeadLetterStorage, ErrorRecord};
use crate::error::{DomainError, DomainResult as Result};
use bon::Builder;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// 死信配置
#[derive(Builder, Clone, Debug, Default)]
pub struct DeadLetterConfig {
    #[builder(into, default)]
    pub service: String,
    #[builder(into, default)]
    pub function: String,
    #[builder(into, default)]
    pub version: String,
    /// 最大尝试次数；0 表示不允许重试
    #[builder(default)]
    pub max_retry: u32,
}

/// 重试预算 + 错误累积。
///
/// 状态机：`Ready(remaining = max)` → `add_error` → `retry()`
/// → `Ready(remaining - 1)` 或 `Exhausted`；`Exhausted` 后 `save` 持久化并复位。
///
/// 计数与错误列表只应由单个 `process` 调用的重试循环访问，不支持多批次并发共享。
pub struct DeadLetterQueue {
    storage: Arc<dyn DeadLetterStorage>,
    config: DeadLetterConfig,
    clock: Arc<dyn Clock>,
    remaining: u32,
    errors: Vec<ErrorRecord>,
}

impl DeadLetterQueue {
    pub fn new(storage: Arc<dyn DeadLetterStorage>, config: DeadLetterConfig) -> Self {
        Self {
            storage,
            remaining: config.max_retry,
            config,
            clock: Arc::new(SystemClock),
            errors: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &DeadLetterConfig {
        &self.config
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// 消耗一次预算，返回是否仍允许再尝试
    pub fn retry(&mut self) -> bool {
        if self.config.max_retry == 0 {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }

    pub fn add_error(&mut self, err: &DomainError) {
        self.errors.push(ErrorRecord::capture(err));
    }

    /// 持久化死信记录；成功后复位预算并清空错误，失败时保留状态
    pub async fn save(&mut self, ctx: &Context, batch: Value) -> Result<()> {
        let record = DeadLetterRecord {
            id: Uuid::new_v4().to_string(),
            service: self.config.service.clone(),
            function: self.config.function.clone(),
            version: self.config.version.clone(),
            time: self.clock.now().timestamp(),
            batch,
            errors: self.errors.clone(),
        };

        self.storage.save(ctx, &record).await?;

        tracing::info!(
            id = %record.id,
            service = %record.service,
            errors = record.errors.len(),
            "batch dead-lettered"
        );

        self.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        self.remaining = self.config.max_retry;
        self.errors.clear();
    }
}
