//! 统一错误定义
//!
//! 覆盖序列化、乐观并发、重放、处理器、panic、存储与死信等最小必要集合，
//! 各实现层统一转换为 `DomainError`。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 事件存储 ---
    #[error("version conflict: entity_id={entity_id}, seq={seq}")]
    VersionConflict { entity_id: String, seq: u64 },
    #[error("missing entity id")]
    MissingEntityId,
    #[error("apply failed: entity_id={entity_id}, seq={seq}, reason={reason}")]
    Apply {
        entity_id: String,
        seq: u64,
        reason: String,
    },
    #[error("storage error: {reason}")]
    Storage { reason: String },

    // --- 分发 ---
    #[error("event handler error: handler={handler}, reason={error:#}")]
    Handler {
        handler: String,
        error: anyhow::Error,
    },
    #[error("panic recovered: {cause}")]
    Panic { cause: String, stack: Vec<String> },
    #[error("dead letter error: {reason}")]
    DeadLetter { reason: String },

    // --- 通用 ---
    #[error("operation cancelled")]
    Cancelled,
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn storage(reason: impl Into<String>) -> Self {
        DomainError::Storage {
            reason: reason.into(),
        }
    }

    pub fn apply(entity_id: impl Into<String>, seq: u64, reason: impl Into<String>) -> Self {
        DomainError::Apply {
            entity_id: entity_id.into(),
            seq,
            reason: reason.into(),
        }
    }

    pub fn handler(handler: impl Into<String>, error: anyhow::Error) -> Self {
        DomainError::Handler {
            handler: handler.into(),
            error,
        }
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, DomainError::VersionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_error_displays_full_chain() {
        let err = DomainError::handler(
            "projector",
            anyhow::anyhow!("row missing").context("update failed"),
        );
        assert_eq!(
            err.to_string(),
            "event handler error: handler=projector, reason=update failed: row missing"
        );
    }

    #[test]
    fn serde_error_converts() {
        let raw = serde_json::from_str::<u64>("nope").unwrap_err();
        let err: DomainError = raw.into();
        assert!(matches!(err, DomainError::Serde { .. }));
        assert!(!err.is_version_conflict());
    }
}
