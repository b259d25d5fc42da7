use crate::{domain_event::EntityEvents, error::DomainResult};
use async_trait::async_trait;
use std::sync::Arc;

/// 领域事件分发器
///
/// 由工作单元在存储提交成功之后调用，每个带事件的实体一个批次；
/// 批次中的事件已从实体上取出，分发器不会看到同一个事件两次。
#[async_trait]
pub trait DomainEventDispatcher: Send + Sync {
    async fn dispatch_and_clear(&self, entities: Vec<EntityEvents>) -> DomainResult<()>;
}

#[async_trait]
impl<T> DomainEventDispatcher for Arc<T>
where
    T: DomainEventDispatcher + ?Sized,
{
    async fn dispatch_and_clear(&self, entities: Vec<EntityEvents>) -> DomainResult<()> {
        (**self).dispatch_and_clear(entities).await
    }
}
