//! 事件存储（EventStore）
//!
//! 基于存储端口（`EventStorage`）的聚合重建与提交：
//! - `get_aggregate`：优先恢复最近快照，再重放快照序号之后的增量事件；
//! - `get_aggregate_by_seq`：跳过快照，从已知检查点继续重放；
//! - `save`：把待提交事件编号、封装为信封（可附带快照）并一次性提交；
//! - `publish_events`：提交不属于任何聚合序列链的独立事件。
//!
//! 版本冲突总是原样返回给调用方，存储自身从不重试。
//!
use crate::aggregate::Aggregate;
use crate::clock::{Clock, SystemClock};
use crate::context::Context;
use crate::domain_event::{DomainEvent, Envelope, encode_payload, event_id, standalone_event_id};
use crate::error::{DomainError, DomainResult as Result};
use crate::persist::{EventStorage, Snapshot};
use bon::Builder;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// 事件存储配置
#[derive(Builder, Clone, Copy, Debug, Default)]
pub struct EventStoreConfig {
    /// 快照结构版本；0 表示关闭快照
    #[builder(default)]
    pub snapshot_version: u32,
}

impl EventStoreConfig {
    pub fn snapshot_enabled(&self) -> bool {
        self.snapshot_version > 0
    }
}

pub struct EventStore<S> {
    storage: S,
    config: EventStoreConfig,
    clock: Arc<dyn Clock>,
}

impl<S> EventStore<S>
where
    S: EventStorage,
{
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: EventStoreConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(mut self, config: EventStoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &EventStoreConfig {
        &self.config
    }

    /// 加载聚合：快照（若开启且存在）+ 其后的增量事件。
    ///
    /// 既无快照也无事件时聚合保持新建状态，这不是错误。
    pub async fn get_aggregate<A>(
        &self,
        ctx: &Context,
        entity_id: &str,
        aggregate: &mut A,
    ) -> Result<()>
    where
        A: Aggregate,
    {
        let mut baseline = 0;

        if self.config.snapshot_enabled() {
            if let Some(snapshot) = self
                .storage
                .get_snapshot(ctx, entity_id, self.config.snapshot_version)
                .await?
            {
                *aggregate = snapshot.to_aggregate::<A>()?;
                aggregate.set_last_event(snapshot.event_id().to_string(), snapshot.time());
                baseline = snapshot.seq();
            }
        }

        aggregate.set_id(entity_id.to_string());
        aggregate.set_sequence(baseline);
        self.replay(ctx, entity_id, aggregate, baseline).await
    }

    /// 从已知检查点 `after_seq` 继续重放（不读取快照）
    pub async fn get_aggregate_by_seq<A>(
        &self,
        ctx: &Context,
        entity_id: &str,
        aggregate: &mut A,
        after_seq: u64,
    ) -> Result<()>
    where
        A: Aggregate,
    {
        aggregate.set_id(entity_id.to_string());
        aggregate.set_sequence(after_seq);
        self.replay(ctx, entity_id, aggregate, after_seq).await
    }

    async fn replay<A>(
        &self,
        ctx: &Context,
        entity_id: &str,
        aggregate: &mut A,
        after_seq: u64,
    ) -> Result<()>
    where
        A: Aggregate,
    {
        let envelopes = self.storage.get_events(ctx, entity_id, after_seq).await?;

        tracing::debug!(
            entity_id,
            baseline = after_seq,
            replayed = envelopes.len(),
            "hydrating aggregate"
        );

        for env in &envelopes {
            aggregate.apply(env).map_err(|e| match e {
                DomainError::Apply { .. } => e,
                other => DomainError::apply(entity_id, env.seq(), other.to_string()),
            })?;
            aggregate.set_sequence(env.seq());
            aggregate.set_last_event(env.id().to_string(), env.time());
        }

        Ok(())
    }

    /// 提交聚合的待提交事件。
    ///
    /// 无待提交事件时直接成功；提交失败（含版本冲突）时聚合的序号与待提交队列保持调用前状态。
    pub async fn save<A>(&self, ctx: &Context, aggregate: &mut A) -> Result<()>
    where
        A: Aggregate,
    {
        if aggregate.pending_events().is_empty() {
            return Ok(());
        }
        if aggregate.id().is_empty() {
            return Err(DomainError::MissingEntityId);
        }

        let entity_id = aggregate.id().to_string();
        let base_seq = aggregate.sequence();
        let now = self.clock.now().timestamp();
        let metadata = ctx.metadata().cloned().unwrap_or_default();

        let mut envelopes = Vec::with_capacity(aggregate.pending_events().len());
        for (i, event) in aggregate.pending_events().iter().enumerate() {
            let seq = base_seq + i as u64 + 1;
            envelopes.push(
                Envelope::builder()
                    .id(event_id(&entity_id, seq))
                    .event_type(event.event_type())
                    .entity_id(entity_id.as_str())
                    .seq(seq)
                    .payload(encode_payload(event)?)
                    .time(now)
                    .metadata(metadata.clone())
                    .build(),
            );
        }

        let Some(last) = envelopes.last().cloned() else {
            return Ok(());
        };

        let prev_event_id = aggregate.last_event_id().map(str::to_string);
        let prev_event_time = aggregate.last_event_time();
        let restore = |aggregate: &mut A| {
            aggregate.set_sequence(base_seq);
            aggregate
                .root_mut()
                .restore_last_event(prev_event_id.clone(), prev_event_time);
        };

        // 快照记录的是提交后的完整聚合
        aggregate.set_sequence(last.seq());
        aggregate.set_last_event(last.id().to_string(), last.time());
        let snapshot = if self.config.snapshot_enabled() {
            match Snapshot::from_aggregate(&*aggregate, &last, self.config.snapshot_version) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    restore(aggregate);
                    return Err(e);
                }
            }
        } else {
            None
        };

        if let Err(e) = self.storage.save(ctx, envelopes, snapshot).await {
            restore(aggregate);
            if e.is_version_conflict() {
                tracing::warn!(entity_id, base_seq, error = %e, "version conflict on save");
            }
            return Err(e);
        }

        tracing::debug!(entity_id, seq = last.seq(), "aggregate saved");

        aggregate.clear_pending();
        Ok(())
    }

    /// 提交独立事件：不依赖聚合重放链，也不附带快照。
    ///
    /// 未指定实体 ID 时自动生成，未指定序号时由当前时间（纳秒）派生。
    pub async fn publish_events(
        &self,
        ctx: &Context,
        events: Vec<NewEvent>,
    ) -> Result<Vec<Envelope>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let base_seq = now
            .timestamp_nanos_opt()
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or_default();
        let metadata = ctx.metadata().cloned().unwrap_or_default();

        let envelopes: Vec<Envelope> = events
            .into_iter()
            .enumerate()
            .map(|(i, ev)| {
                Envelope::builder()
                    .id(standalone_event_id())
                    .event_type(ev.event_type)
                    .entity_id(ev.entity_id.unwrap_or_else(|| Uuid::new_v4().to_string()))
                    .seq(ev.seq.unwrap_or(base_seq + i as u64))
                    .payload(ev.payload)
                    .time(now.timestamp())
                    .metadata(metadata.clone())
                    .maybe_expired_at(ev.expired_at)
                    .build()
            })
            .collect();

        self.storage.save(ctx, envelopes.clone(), None).await?;
        Ok(envelopes)
    }

    pub async fn get_events(
        &self,
        ctx: &Context,
        entity_id: &str,
        after_seq: u64,
    ) -> Result<Vec<Envelope>> {
        self.storage.get_events(ctx, entity_id, after_seq).await
    }

    /// 读取当前配置版本的快照；快照关闭时返回 `None`
    pub async fn get_snapshot(&self, ctx: &Context, entity_id: &str) -> Result<Option<Snapshot>> {
        self.storage
            .get_snapshot(ctx, entity_id, self.config.snapshot_version)
            .await
    }
}

/// 独立事件（集成事件/无聚合身份的领域事件）
#[derive(Debug, Clone)]
pub struct NewEvent {
    event_type: String,
    payload: Value,
    entity_id: Option<String>,
    seq: Option<u64>,
    expired_at: Option<i64>,
}

impl NewEvent {
    pub fn new<E>(event: &E) -> Result<Self>
    where
        E: DomainEvent,
    {
        Ok(Self {
            event_type: event.event_type().to_string(),
            payload: encode_payload(event)?,
            entity_id: None,
            seq: None,
            expired_at: None,
        })
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_expiry(mut self, expired_at: i64) -> Self {
        self.expired_at = Some(expired_at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateRoot;
    use crate::clock::FixedClock;
    use crate::domain_event::Metadata;
    use crate::persist::InMemoryEventStorage;
    use chrono::{TimeZone, Utc};
    use eventflow_macros::{aggregate_root, domain_event};

    #[domain_event]
    enum NoteEvent {
        Written { text: String },
        Poisoned,
    }

    #[aggregate_root(event = NoteEvent)]
    #[derive(Clone, PartialEq)]
    struct Note {
        lines: Vec<String>,
    }

    impl Note {
        fn write(&mut self, text: &str) {
            self.lines.push(text.to_string());
            self.publish(NoteEvent::Written { text: text.into() });
        }
    }

    impl Aggregate for Note {
        fn apply(&mut self, envelope: &Envelope) -> Result<()> {
            match envelope.payload_as::<NoteEvent>()? {
                NoteEvent::Written { text } => self.lines.push(text),
                NoteEvent::Poisoned => {
                    return Err(DomainError::apply(
                        envelope.entity_id(),
                        envelope.seq(),
                        "poisoned",
                    ));
                }
            }
            Ok(())
        }
    }

    fn store() -> EventStore<Arc<InMemoryEventStorage>> {
        EventStore::new(Arc::new(InMemoryEventStorage::new())).with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        )))
    }

    #[tokio::test]
    async fn save_without_pending_is_noop() {
        let store = store();
        let mut note = Note::default();
        store.save(&Context::new(), &mut note).await.unwrap();
        assert!(store.storage().is_empty());
    }

    #[tokio::test]
    async fn save_requires_entity_id() {
        let store = store();
        let mut note = Note::default();
        note.write("hello");
        let err = store.save(&Context::new(), &mut note).await.unwrap_err();
        assert!(matches!(err, DomainError::MissingEntityId));
        assert_eq!(note.pending_events().len(), 1);
    }

    #[tokio::test]
    async fn save_stamps_time_metadata_and_ids() {
        let store = store();
        let ctx = Context::new().with_metadata(Metadata::new().with_user_id("u-9"));

        let mut note = Note::default();
        note.set_id("n-1".into());
        note.write("a");
        note.write("b");
        store.save(&ctx, &mut note).await.unwrap();

        assert_eq!(note.sequence(), 2);
        assert!(note.pending_events().is_empty());
        assert_eq!(note.last_event_id(), Some(event_id("n-1", 2).as_str()));

        let events = store.get_events(&ctx, "n-1", 0).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "NoteEvent.Written");
        assert_eq!(events[1].id(), event_id("n-1", 2));
        assert_eq!(events[1].metadata().user_id(), Some("u-9"));
        assert_eq!(events[1].time(), note.last_event_time());
        assert_eq!(
            events[1].time(),
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().timestamp()
        );
    }

    #[tokio::test]
    async fn apply_failure_stops_replay() {
        let store = store();
        let ctx = Context::new();
        let mut note = Note::default();
        note.set_id("n-2".into());
        note.write("first");
        note.publish(NoteEvent::Poisoned);
        note.write("never");
        store.save(&ctx, &mut note).await.unwrap();

        let mut loaded = Note::default();
        let err = store.get_aggregate(&ctx, "n-2", &mut loaded).await.unwrap_err();
        match err {
            DomainError::Apply { seq, .. } => assert_eq!(seq, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(loaded.lines, vec!["first".to_string()]);
        // 未能重放的事件不推进序号
        assert_eq!(loaded.sequence(), 1);
        assert_eq!(loaded.last_event_id(), Some(event_id("n-2", 1).as_str()));
    }

    #[tokio::test]
    async fn conflict_restores_sequence_and_pending() {
        let store = store();
        let ctx = Context::new();

        let mut first = Note::default();
        first.set_id("n-3".into());
        first.write("x");
        store.save(&ctx, &mut first).await.unwrap();

        let mut stale = Note::default();
        stale.set_id("n-3".into());
        stale.write("y");
        let err = store.save(&ctx, &mut stale).await.unwrap_err();
        assert!(err.is_version_conflict());
        assert_eq!(stale.sequence(), 0);
        assert_eq!(stale.pending_events().len(), 1);
        assert_eq!(stale.last_event_id(), None);
    }

    #[tokio::test]
    async fn snapshot_records_committed_last_event() {
        let store = store().with_config(EventStoreConfig::builder().snapshot_version(1).build());
        let ctx = Context::new();
        let mut note = Note::default();
        note.set_id("n-5".into());
        note.write("a");
        store.save(&ctx, &mut note).await.unwrap();
        note.write("b");
        store.save(&ctx, &mut note).await.unwrap();

        let mut loaded = Note::default();
        store.get_aggregate(&ctx, "n-5", &mut loaded).await.unwrap();
        assert_eq!(loaded.sequence(), 2);
        assert_eq!(loaded.last_event_id(), Some(event_id("n-5", 2).as_str()));
        assert_eq!(loaded.lines, note.lines);
    }

    #[tokio::test]
    async fn by_seq_resumes_from_checkpoint() {
        let store = store();
        let ctx = Context::new();
        let mut note = Note::default();
        note.set_id("n-4".into());
        for t in ["a", "b", "c"] {
            note.write(t);
        }
        store.save(&ctx, &mut note).await.unwrap();

        let mut tail = Note::default();
        store
            .get_aggregate_by_seq(&ctx, "n-4", &mut tail, 1)
            .await
            .unwrap();
        assert_eq!(tail.lines, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(tail.sequence(), 3);
    }

    #[tokio::test]
    async fn publish_events_assigns_ids_and_time_sequence() {
        let store = store();
        let ctx = Context::new();
        let published = store
            .publish_events(
                &ctx,
                vec![
                    NewEvent::new(&NoteEvent::Written { text: "x".into() }).unwrap(),
                    NewEvent::new(&NoteEvent::Written { text: "y".into() })
                        .unwrap()
                        .with_entity_id("feed")
                        .with_expiry(99),
                    NewEvent::new(&NoteEvent::Written { text: "z".into() })
                        .unwrap()
                        .with_entity_id("feed"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(published.len(), 3);
        assert!(Uuid::parse_str(published[0].entity_id()).is_ok());
        assert_eq!(published[1].expired_at(), Some(99));
        assert_eq!(published[2].seq(), published[1].seq() + 1);

        let feed = store.get_events(&ctx, "feed", 0).await.unwrap();
        assert_eq!(feed.len(), 2);
    }
}
