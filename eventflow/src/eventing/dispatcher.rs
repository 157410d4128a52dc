//! 分区流式分发器（Dispatcher）
//!
//! 编排一批变更日志记录的完整处理流程：
//! - 仅保留 `Insert` 记录并按事件类型过滤；
//! - 由分区策略切分为处理单元，每个单元一个任务并发执行；
//! - 单元内依次执行 pre → main（并发）→ post 处理器，边界处隔离 panic；
//! - 失败时通知错误观察者，按死信预算重试，耗尽后整批写入死信。
//!
use super::handler::{ErrorHandler, EventHandler};
use super::recover::panic_error;
use super::strategy::{PartitionByKey, PartitionStrategy};
use super::Record;
use crate::context::Context;
use crate::deadletter::DeadLetterQueue;
use crate::domain_event::Envelope;
use crate::error::{DomainError, DomainResult as Result};
use bon::Builder;
use futures_util::FutureExt;
use futures_util::future::join_all;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// 分发器配置
#[derive(Builder, Clone, Copy, Debug)]
pub struct DispatcherConfig {
    /// 未挂载死信时的最大尝试次数（0 按 1 处理）
    #[builder(default = 1)]
    pub max_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { max_attempts: 1 }
    }
}

pub struct Dispatcher {
    strategy: Arc<dyn PartitionStrategy>,
    pipeline: Arc<Pipeline>,
    filter: Option<HashSet<String>>,
    dead_letter: Option<Mutex<DeadLetterQueue>>,
    config: DispatcherConfig,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(PartitionByKey::new())
    }
}

impl Dispatcher {
    pub fn new(strategy: impl PartitionStrategy + 'static) -> Self {
        Self {
            strategy: Arc::new(strategy),
            pipeline: Arc::new(Pipeline::default()),
            filter: None,
            dead_letter: None,
            config: DispatcherConfig::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn PartitionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// 单元内按注册顺序依次执行，首个错误即终止该单元
    pub fn with_pre_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        Arc::make_mut(&mut self.pipeline).pre.push(handler);
        self
    }

    /// 单元内并发执行，各自只接收其订阅类型的事件
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        Arc::make_mut(&mut self.pipeline).main.push(handler);
        self
    }

    pub fn with_post_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        Arc::make_mut(&mut self.pipeline).post.push(handler);
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        Arc::make_mut(&mut self.pipeline).on_error.push(handler);
        self
    }

    /// 分发前只保留这些类型的事件（可多次调用累加）
    pub fn with_filter_events<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.filter
            .get_or_insert_with(HashSet::new)
            .extend(types.into_iter().map(Into::into));
        self
    }

    pub fn with_dead_letter(mut self, queue: DeadLetterQueue) -> Self {
        self.dead_letter = Some(Mutex::new(queue));
        self
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 处理一批记录。
    ///
    /// 挂载死信时，重试耗尽且死信写入成功即视为成功；
    /// 否则在 `max_attempts` 次尝试后返回最后一次的错误。
    pub async fn process(&self, ctx: &Context, records: &[Record]) -> Result<()> {
        let messages: Vec<Envelope> = records
            .iter()
            .filter(|r| r.is_insert())
            .filter(|r| self.accepts(r.envelope.event_type()))
            .map(|r| r.envelope.clone())
            .collect();

        if messages.is_empty() {
            return Ok(());
        }

        let total = messages.len();
        let units = self.strategy.split(messages);
        tracing::debug!(
            strategy = self.strategy.name(),
            messages = total,
            units = units.len(),
            "batch split"
        );

        match &self.dead_letter {
            Some(queue) => {
                let mut queue = queue.lock().await;
                // 上一批死信写入失败时残留的状态不计入本批
                queue.reset();
                let mut attempt: u32 = 0;
                loop {
                    ctx.ensure_active()?;
                    attempt += 1;
                    match self.attempt(ctx, &units).await {
                        Ok(()) => {
                            queue.reset();
                            return Ok(());
                        }
                        Err(err) => {
                            tracing::warn!(attempt, error = %err, "dispatch attempt failed");
                            queue.add_error(&err);
                            if queue.retry() {
                                continue;
                            }

                            let batch = serde_json::to_value(records)?;
                            return queue.save(ctx, batch).await.inspect_err(|e| {
                                tracing::error!(error = %e, "failed to persist dead letter");
                            });
                        }
                    }
                }
            }
            None => {
                let max_attempts = self.config.max_attempts.max(1);
                let mut attempt: u32 = 0;
                loop {
                    ctx.ensure_active()?;
                    attempt += 1;
                    match self.attempt(ctx, &units).await {
                        Ok(()) => return Ok(()),
                        Err(err) => {
                            tracing::warn!(attempt, error = %err, "dispatch attempt failed");
                            if attempt >= max_attempts {
                                return Err(err);
                            }
                        }
                    }
                }
            }
        }
    }

    fn accepts(&self, event_type: &str) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|types| types.contains(event_type))
    }

    /// 一次尝试：每个单元一个任务，等待全部完成，按单元顺序取首个错误。
    ///
    /// 任务归属于本次调用的 `JoinSet`，调用方丢弃 `process` 时未完成的单元随之中止。
    async fn attempt(&self, ctx: &Context, units: &[Vec<Envelope>]) -> Result<()> {
        let mut set = JoinSet::new();
        for (index, unit) in units.iter().enumerate() {
            let pipeline = self.pipeline.clone();
            let ctx = ctx.clone();
            let unit = unit.clone();
            set.spawn(async move { (index, pipeline.run_unit(&ctx, &unit).await) });
        }

        let mut failures: Vec<(usize, DomainError)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(err))) => failures.push((index, err)),
                Err(e) => failures.push((
                    usize::MAX,
                    DomainError::Panic {
                        cause: e.to_string(),
                        stack: Vec::new(),
                    },
                )),
            }
        }

        match failures.into_iter().min_by_key(|(index, _)| *index) {
            Some((_, err)) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Default)]
struct Pipeline {
    pre: Vec<Arc<dyn EventHandler>>,
    main: Vec<Arc<dyn EventHandler>>,
    post: Vec<Arc<dyn EventHandler>>,
    on_error: Vec<Arc<dyn ErrorHandler>>,
}

impl Pipeline {
    async fn run_unit(&self, ctx: &Context, unit: &[Envelope]) -> Result<()> {
        let result = match AssertUnwindSafe(self.run_stages(ctx, unit))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let err = panic_error(payload);
                tracing::warn!(error = %err, messages = unit.len(), "handler panicked");
                Err(err)
            }
        };

        if let Err(err) = &result {
            self.notify(ctx, unit, err).await;
        }
        result
    }

    async fn run_stages(&self, ctx: &Context, unit: &[Envelope]) -> Result<()> {
        for h in &self.pre {
            run_handler(h.as_ref(), ctx, unit).await?;
        }

        let main = self.main.iter().filter_map(|h| {
            let accepted = h.handled_event_type();
            let subset: Vec<Envelope> = unit
                .iter()
                .filter(|e| accepted.matches(e.event_type()))
                .cloned()
                .collect();
            if subset.is_empty() {
                None
            } else {
                Some(async move { run_handler(h.as_ref(), ctx, &subset).await })
            }
        });
        for outcome in join_all(main).await {
            outcome?;
        }

        for h in &self.post {
            run_handler(h.as_ref(), ctx, unit).await?;
        }
        Ok(())
    }

    async fn notify(&self, ctx: &Context, unit: &[Envelope], err: &DomainError) {
        for h in &self.on_error {
            match AssertUnwindSafe(h.on_error(ctx, unit, err))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "error handler failed"),
                Err(payload) => {
                    let e = panic_error(payload);
                    tracing::warn!(error = %e, "error handler panicked");
                }
            }
        }
    }
}

async fn run_handler(h: &dyn EventHandler, ctx: &Context, events: &[Envelope]) -> Result<()> {
    h.handle(ctx, events)
        .await
        .map_err(|e| DomainError::handler(h.handler_name(), e))
}
