use crate::{aggregate::Aggregate, domain_event::Envelope, error::DomainResult as Result};
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 聚合在某一序号处的物化状态，仅用于加速读取。
///
/// 快照序号总是不大于实体的真实当前序号，使用时必须继续重放其后的事件。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct Snapshot {
    #[builder(into)]
    entity_id: String,
    /// 序列化后的完整聚合状态
    state: Value,
    #[builder(into)]
    event_id: String,
    time: i64,
    seq: u64,
    /// 快照结构版本
    version: u32,
}

impl Snapshot {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// 将快照反序列化为聚合实例
    pub fn to_aggregate<A>(&self) -> Result<A>
    where
        A: Aggregate,
    {
        Ok(serde_json::from_value(self.state.clone())?)
    }

    /// 以提交后的聚合与最后一条信封创建快照
    pub fn from_aggregate<A>(aggregate: &A, last: &Envelope, version: u32) -> Result<Self>
    where
        A: Aggregate,
    {
        Ok(Self {
            entity_id: last.entity_id().to_string(),
            state: serde_json::to_value(aggregate)?,
            event_id: last.id().to_string(),
            time: last.time(),
            seq: last.seq(),
            version,
        })
    }
}
