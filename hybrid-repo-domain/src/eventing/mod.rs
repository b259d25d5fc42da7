//! 事件分发（eventing）
//!
//! 提交成功之后把实体上取出的领域事件交给 `DomainEventDispatcher`；
//! `SubscriberDispatcher` 是按事件类型路由到 `EventSubscriber` 的默认实现。
//!
mod dispatcher;
mod subscriber;
mod subscriber_dispatcher;

pub use dispatcher::DomainEventDispatcher;
pub use subscriber::{EventSubscriber, HandledEventType};
pub use subscriber_dispatcher::SubscriberDispatcher;
