//! 调用上下文（Context）
//!
//! 承载一次调用所需的横切信息：
//! - 环境元数据（`Metadata`）：保存新事件时写入信封，例如用户 ID、关联 ID；
//! - 取消令牌与截止时间：贯穿处理器、存储端口与死信存储的每一次调用。
//!
//! 典型用法：
//! ```rust
//! use eventflow::context::Context;
//! use eventflow::domain_event::Metadata;
//!
//! let ctx = Context::new().with_metadata(
//!     Metadata::new()
//!         .with_user_id("u-1")
//!         .with_correlation_id("cor-123"),
//! );
//! assert_eq!(ctx.metadata().and_then(|m| m.user_id()), Some("u-1"));
//! assert!(ctx.ensure_active().is_ok());
//! ```
use crate::domain_event::Metadata;
use crate::error::{DomainError, DomainResult};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, Default)]
pub struct Context {
    metadata: Option<Metadata>,
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// 环境元数据；未设置时返回 `None`（不写入任何元数据）
    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// 已取消或已超过截止时间时返回 `DomainError::Cancelled`
    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        Ok(())
    }
}
