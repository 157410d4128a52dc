//! 存储端口与事件存储（persist）
//!
//! - `EventStorage`：按实体有序、只追加的事件日志与可选快照存储的抽象；
//! - `InMemoryEventStorage`：以单把互斥锁保证冲突检查与追加原子性的参考实现；
//! - `EventStore`：基于存储端口的聚合重建（快照 + 增量重放）与乐观并发提交。
//!
//! 具体存储后端（如 DynamoDB、Postgres）由上层实现 `EventStorage` 并注入。
//!
mod event_storage;
mod event_store;
mod memory;
mod snapshot;

pub use event_storage::EventStorage;
pub use event_store::{EventStore, EventStoreConfig, NewEvent};
pub use memory::InMemoryEventStorage;
pub use snapshot::Snapshot;
