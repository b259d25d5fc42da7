//! 事件订阅者（EventSubscriber）
//!
//! 定义消费某类/多类/全部领域事件的处理逻辑与元信息（名称、订阅类型）。
//!
use crate::domain_event::DomainEvent;
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub enum HandledEventType {
    One(String),
    Many(Vec<String>),
    All,
}

/// 事件订阅者：处理提交成功后分发的领域事件
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// 订阅者名称（用于失败报告与日志）
    fn subscriber_name(&self) -> &str;
    /// 返回该订阅者关心的事件类型
    fn handled_event_type(&self) -> HandledEventType;
    /// 处理事件
    async fn handle(&self, event: &dyn DomainEvent) -> anyhow::Result<()>;
}
