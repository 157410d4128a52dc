//! 聚合（Aggregate）抽象
//!
//! 聚合状态完全由事件历史重放得到：
//! - `AggregateBase` 内嵌于具体聚合，保存 ID、当前序号、待提交事件队列与最近事件信息；
//! - `AggregateRoot` 提供对内嵌状态的统一访问（通常由 `#[aggregate_root]` 宏生成）；
//! - `Aggregate::apply` 将一条已持久化的信封重放到自身状态。
//!
//! 生命周期：空构造 → 由 `EventStore` 重放（或保持新建）→ 领域方法内部 `publish`
//! 待提交事件 → `EventStore::save` 提交、序号前进 `len(pending)` 并清空队列。
//!
use crate::domain_event::{DomainEvent, Envelope};
use crate::error::DomainResult;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// 聚合内嵌状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct AggregateBase<E> {
    id: String,
    sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_event_id: Option<String>,
    #[serde(default)]
    last_event_time: i64,
    /// 待提交事件，不参与快照序列化
    #[serde(skip)]
    pending: Vec<E>,
}

impl<E> Default for AggregateBase<E> {
    fn default() -> Self {
        Self {
            id: String::new(),
            sequence: 0,
            last_event_id: None,
            last_event_time: 0,
            pending: Vec::new(),
        }
    }
}

impl<E> AggregateBase<E> {
    /// 提交失败时恢复调用前的最近事件信息
    pub(crate) fn restore_last_event(&mut self, event_id: Option<String>, time: i64) {
        self.last_event_id = event_id;
        self.last_event_time = time;
    }
}

/// 聚合根：对内嵌 `AggregateBase` 的统一访问
pub trait AggregateRoot: Send + Sync {
    /// 该聚合产生的领域事件类型
    type Event: DomainEvent;

    fn root(&self) -> &AggregateBase<Self::Event>;

    fn root_mut(&mut self) -> &mut AggregateBase<Self::Event>;

    fn id(&self) -> &str {
        &self.root().id
    }

    fn set_id(&mut self, id: String) {
        self.root_mut().id = id;
    }

    /// 当前序号（最后一条已提交事件的序号，新建为 0）
    fn sequence(&self) -> u64 {
        self.root().sequence
    }

    fn set_sequence(&mut self, sequence: u64) {
        self.root_mut().sequence = sequence;
    }

    fn pending_events(&self) -> &[Self::Event] {
        &self.root().pending
    }

    /// 追加一条待提交事件（由领域方法在变更状态后调用）
    fn publish(&mut self, event: Self::Event) {
        self.root_mut().pending.push(event);
    }

    fn clear_pending(&mut self) {
        self.root_mut().pending.clear();
    }

    fn is_new(&self) -> bool {
        self.root().sequence == 0 && self.root().pending.is_empty()
    }

    fn last_event_id(&self) -> Option<&str> {
        self.root().last_event_id.as_deref()
    }

    fn last_event_time(&self) -> i64 {
        self.root().last_event_time
    }

    fn set_last_event(&mut self, event_id: String, time: i64) {
        let root = self.root_mut();
        root.last_event_id = Some(event_id);
        root.last_event_time = time;
    }
}

/// 可由事件存储重建与提交的聚合
pub trait Aggregate: AggregateRoot + Serialize + DeserializeOwned {
    /// 重放一条已持久化的事件信封
    fn apply(&mut self, envelope: &Envelope) -> DomainResult<()>;
}
