use crate::{
    context::Context, domain_event::Envelope, error::DomainResult as Result, persist::Snapshot,
};
use async_trait::async_trait;
use std::sync::Arc;

/// 存储端口：按实体有序、只追加的事件日志，外加可选的快照存储。
///
/// 实现方只需要能按实体 ID 与序号寻址；信封的其余字段对存储而言是不透明负载。
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// 返回 `seq > after_seq` 的事件，按序号升序；不存在时返回空列表
    async fn get_events(
        &self,
        ctx: &Context,
        entity_id: &str,
        after_seq: u64,
    ) -> Result<Vec<Envelope>>;

    /// `version == 0` 表示不请求快照，总是返回 `None`
    async fn get_snapshot(
        &self,
        ctx: &Context,
        entity_id: &str,
        version: u32,
    ) -> Result<Option<Snapshot>>;

    /// 原子保存：信封全部追加（并保存快照）或全部不生效。
    ///
    /// 批次中任一 (entity_id, seq) 已存在时必须返回 `DomainError::VersionConflict`，
    /// 这是乐观并发的唯一闸门。
    async fn save(
        &self,
        ctx: &Context,
        envelopes: Vec<Envelope>,
        snapshot: Option<Snapshot>,
    ) -> Result<()>;
}

#[async_trait]
impl<T> EventStorage for Arc<T>
where
    T: EventStorage + ?Sized,
{
    async fn get_events(
        &self,
        ctx: &Context,
        entity_id: &str,
        after_seq: u64,
    ) -> Result<Vec<Envelope>> {
        (**self).get_events(ctx, entity_id, after_seq).await
    }

    async fn get_snapshot(
        &self,
        ctx: &Context,
        entity_id: &str,
        version: u32,
    ) -> Result<Option<Snapshot>> {
        (**self).get_snapshot(ctx, entity_id, version).await
    }

    async fn save(
        &self,
        ctx: &Context,
        envelopes: Vec<Envelope>,
        snapshot: Option<Snapshot>,
    ) -> Result<()> {
        (**self).save(ctx, envelopes, snapshot).await
    }
}
