//! 事件处理器（EventHandler / ErrorHandler）
//!
//! 定义消费某类/多类/全部事件的处理逻辑与元信息（名称、订阅类型），
//! 以及在处理单元失败时被通知的错误观察者。
//!
use crate::context::Context;
use crate::domain_event::Envelope;
use crate::error::DomainError;
use async_trait::async_trait;

#[derive(Clone, Debug, Default)]
pub enum HandledEventType {
    One(String),
    Many(Vec<String>),
    #[default]
    All,
}

impl HandledEventType {
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            HandledEventType::All => true,
            HandledEventType::One(t) => t == event_type,
            HandledEventType::Many(ts) => ts.iter().any(|t| t == event_type),
        }
    }
}

/// 事件处理器：按到达顺序处理一个处理单元内（已按订阅类型过滤）的事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于错误记录与日志）
    fn handler_name(&self) -> &str;
    /// 返回该处理器支持的事件类型
    fn handled_event_type(&self) -> HandledEventType {
        HandledEventType::All
    }
    /// 处理事件
    async fn handle(&self, ctx: &Context, events: &[Envelope]) -> anyhow::Result<()>;
}

/// 错误观察者：处理单元失败时被调用一次，尽力而为，返回的错误只记录日志
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn on_error(
        &self,
        ctx: &Context,
        events: &[Envelope],
        error: &DomainError,
    ) -> anyhow::Result<()>;
}
