//! 死信（deadletter）
//!
//! 有界重试计数与错误累积：处理失败时累积结构化错误，重试预算耗尽后
//! 将原始批次与全部错误写入持久化死信存储，然后复位，等待下一批。
//!
//! - `DeadLetterQueue`：重试预算 + 错误累积的状态机；
//! - `DeadLetterRecord` / `ErrorRecord`：持久化的死信记录与结构化错误；
//! - `DeadLetterStorage`：持久化死信存储协议（含内存实现）。
//!
mod queue;
mod record;
mod storage;

pub use queue::{DeadLetterConfig, DeadLetterQueue};
pub use record::{DeadLetterRecord, ErrorRecord, HandlerInput};
pub(crate) use record::capture_stack;
pub use storage::{DeadLetterStorage, InMemoryDeadLetterStorage};
