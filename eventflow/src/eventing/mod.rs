//! 分发子系统（eventing）
//!
//! 消费一批变更日志记录并编排处理：
//! - `Record`：操作类型 + 事件信封，仅 `Insert` 参与分发；
//! - `PartitionStrategy`：将消息切分为处理单元（按键分区/固定分片/整批）；
//! - `EventHandler` / `ErrorHandler`：处理器与失败观察者；
//! - `Dispatcher`：pre/main/post 管线、panic 隔离、重试与死信。
//!
//! 不绑定任何传输实现，记录由上层从具体的流/队列中解码后传入。
//!
pub mod dispatcher;
pub mod handler;
pub mod record;
mod recover;
pub mod strategy;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use handler::{ErrorHandler, EventHandler, HandledEventType};
pub use record::{Operation, Record};
pub use recover::install_panic_hook;
pub use strategy::{PartitionByKey, PartitionKey, PartitionStrategy, ShardByKey, Simple};
