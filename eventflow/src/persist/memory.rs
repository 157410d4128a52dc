//! 内存版存储端口（InMemoryEventStorage）
//!
//! 每个实体一份按序号排序的事件表，每个 (实体, 快照版本) 一份快照，
//! 全部由同一把互斥锁保护，使“冲突检查 + 追加 + 写快照”成为原子操作。
//! 典型用途：测试环境、示例与本地开发。
//!
use crate::context::Context;
use crate::domain_event::Envelope;
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{EventStorage, Snapshot};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct State {
    events: HashMap<String, BTreeMap<u64, Envelope>>,
    snapshots: HashMap<(String, u32), Snapshot>,
}

#[derive(Default)]
pub struct InMemoryEventStorage {
    state: Mutex<State>,
}

impl InMemoryEventStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| DomainError::storage(format!("in-memory storage poisoned: {e}")))
    }

    /// 已保存的事件总数。
    ///
    /// 只读统计：锁中毒时仍读取其中的数据，而不是报告 0。
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.events.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStorage for InMemoryEventStorage {
    async fn get_events(
        &self,
        ctx: &Context,
        entity_id: &str,
        after_seq: u64,
    ) -> Result<Vec<Envelope>> {
        ctx.ensure_active()?;
        let state = self.lock()?;
        let Some(stream) = state.events.get(entity_id) else {
            return Ok(Vec::new());
        };
        Ok(stream
            .range(after_seq.saturating_add(1)..)
            .map(|(_, env)| env.clone())
            .collect())
    }

    async fn get_snapshot(
        &self,
        ctx: &Context,
        entity_id: &str,
        version: u32,
    ) -> Result<Option<Snapshot>> {
        ctx.ensure_active()?;
        if version == 0 {
            return Ok(None);
        }
        let state = self.lock()?;
        Ok(state
            .snapshots
            .get(&(entity_id.to_string(), version))
            .cloned())
    }

    async fn save(
        &self,
        ctx: &Context,
        envelopes: Vec<Envelope>,
        snapshot: Option<Snapshot>,
    ) -> Result<()> {
        ctx.ensure_active()?;
        let mut state = self.lock()?;

        // 先整体检查冲突（含批内重复），通过后再追加
        let mut seen: HashSet<(&str, u64)> = HashSet::with_capacity(envelopes.len());
        for env in &envelopes {
            let exists = state
                .events
                .get(env.entity_id())
                .is_some_and(|stream| stream.contains_key(&env.seq()));
            if exists || !seen.insert((env.entity_id(), env.seq())) {
                return Err(DomainError::VersionConflict {
                    entity_id: env.entity_id().to_string(),
                    seq: env.seq(),
                });
            }
        }

        for env in envelopes {
            state
                .events
                .entry(env.entity_id().to_string())
                .or_default()
                .insert(env.seq(), env);
        }

        if let Some(snapshot) = snapshot {
            let key = (snapshot.entity_id().to_string(), snapshot.version());
            state.snapshots.insert(key, snapshot);
        }

        Ok(())
    }
}
