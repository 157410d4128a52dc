use crate::domain_event::Envelope;
use serde::{Deserialize, Serialize};

/// 变更日志中的操作类型，仅 `Insert` 会被分发
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Modify,
    Remove,
}

/// 变更日志记录：操作类型 + 事件信封
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub operation: Operation,
    pub envelope: Envelope,
}

impl Record {
    pub fn new(operation: Operation, envelope: Envelope) -> Self {
        Self {
            operation,
            envelope,
        }
    }

    pub fn insert(envelope: Envelope) -> Self {
        Self::new(Operation::Insert, envelope)
    }

    pub fn is_insert(&self) -> bool {
        self.operation == Operation::Insert
    }
}
