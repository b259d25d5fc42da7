use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;

/// 领域事件：由业务逻辑产生、不可变的事实
///
/// 以 `Arc<dyn DomainEvent>` 形式排队在所属实体上，提交成功后分发。
pub trait DomainEvent: Any + fmt::Debug + Send + Sync {
    /// 事件类型（形如 `OrderEvent.Placed` 或自定义类型名），订阅者按此匹配
    fn event_type(&self) -> &str;

    /// 事件发生时间
    fn occurred_at(&self) -> DateTime<Utc>;

    /// 供订阅者向下转型为具体事件类型
    fn as_any(&self) -> &dyn Any;
}

impl dyn DomainEvent {
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    pub fn is<E: DomainEvent>(&self) -> bool {
        self.as_any().is::<E>()
    }
}
