use crate::context::Context;
use crate::deadletter::DeadLetterRecord;
use crate::error::{DomainError, DomainResult as Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// 死信持久化存储
#[async_trait]
pub trait DeadLetterStorage: Send + Sync {
    async fn save(&self, ctx: &Context, record: &DeadLetterRecord) -> Result<()>;
}

#[async_trait]
impl<T> DeadLetterStorage for Arc<T>
where
    T: DeadLetterStorage + ?Sized,
{
    async fn save(&self, ctx: &Context, record: &DeadLetterRecord) -> Result<()> {
        (**self).save(ctx, record).await
    }
}

/// 内存版死信存储（测试与本地开发）
#[derive(Clone, Default)]
pub struct InMemoryDeadLetterStorage {
    records: Arc<Mutex<Vec<DeadLetterRecord>>>,
}

impl InMemoryDeadLetterStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeadLetterStorage for InMemoryDeadLetterStorage {
    async fn save(&self, ctx: &Context, record: &DeadLetterRecord) -> Result<()> {
        ctx.ensure_active()?;
        self.records
            .lock()
            .map_err(|e| DomainError::DeadLetter {
                reason: e.to_string(),
            })?
            .push(record.clone());
        Ok(())
    }
}
