//! 事件信封与元数据（domain_event）
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`）、持久化后的不可变记录
//! `Envelope` 及其开放的键值元数据 `Metadata`，以及事件 ID 的派生规则。
//! 本层只有数据与两类编码（完整信封编码、事件载荷编码），不含业务逻辑。

mod domain_event_trait;
mod event_envelope;
mod event_id;
mod metadata;

pub use domain_event_trait::DomainEvent;
pub use event_envelope::{Envelope, encode_payload};
pub use event_id::{event_id, standalone_event_id};
pub use metadata::Metadata;
