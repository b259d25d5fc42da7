//! 领域事件（Domain Event）
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`）、实体独占的待分发事件队列
//! （`DomainEvents`），以及提交成功后交给分发器的按实体快照（`EntityEvents`）。

mod domain_event_trait;
mod domain_events;
mod entity_events;

pub use domain_event_trait::DomainEvent;
pub use domain_events::DomainEvents;
pub use entity_events::EntityEvents;
