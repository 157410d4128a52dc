//! 事件溯源与流式分发核心库（eventflow）
//!
//! 面向无服务器、事件驱动服务的两块核心能力：
//! - 事件存储（`persist`）：以事件日志（可选快照加速）重建聚合，并以乐观并发提交新事件；
//! - 分区流式分发（`eventing`）：将一批变更日志记录按实体分组，同一实体内严格有序、
//!   不同实体之间并发，执行 pre/main/post 处理管线并隔离 panic；
//!   重试耗尽后将整批交给死信（`deadletter`）持久化，而不是丢弃。
//!
//! 本 crate 仅定义核心协议与参考实现（内存存储），具体存储与传输由上层注入。
//!
//! 典型用法：
//! 1. 用 `#[domain_event]` 定义事件，用 `#[aggregate_root(event = ..)]` 定义聚合并实现 `Aggregate::apply`；
//! 2. 选择 `EventStorage` 实现并构建 `EventStore`，通过 `get_aggregate/save` 完成加载与提交；
//! 3. 使用 `Dispatcher` 注册处理器与分区策略，调用 `process` 消费一批记录。
//!
pub mod aggregate;
pub mod clock;
pub mod context;
pub mod deadletter;
pub mod domain_event;
pub mod error;
#[cfg(feature = "eventing")]
pub mod eventing;
pub mod persist;

// 允许在本 crate 内部通过 ::eventflow 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::eventflow 路径。
extern crate self as eventflow;
