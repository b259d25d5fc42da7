use super::DomainEvent;
use std::fmt;
use std::slice::Iter;
use std::sync::Arc;

/// 实体独占的待分发事件队列，按插入顺序排列
///
/// 克隆实体时队列随之复制（事件本身不可变，按 `Arc` 共享）。
#[derive(Clone, Default)]
pub struct DomainEvents {
    events: Vec<Arc<dyn DomainEvent>>,
}

impl DomainEvents {
    pub fn push(&mut self, event: Arc<dyn DomainEvent>) {
        self.events.push(event);
    }

    /// 按引用移除某个事件，返回是否存在
    pub fn remove(&mut self, event: &Arc<dyn DomainEvent>) -> bool {
        let before = self.events.len();
        self.events.retain(|e| !Arc::ptr_eq(e, event));
        self.events.len() != before
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// 先快照、后清空
    pub fn take(&mut self) -> Vec<Arc<dyn DomainEvent>> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, Arc<dyn DomainEvent>> {
        self.events.iter()
    }
}

impl<'a> IntoIterator for &'a DomainEvents {
    type Item = &'a Arc<dyn DomainEvent>;
    type IntoIter = Iter<'a, Arc<dyn DomainEvent>>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl fmt::Debug for DomainEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.events.iter().map(|e| e.event_type()))
            .finish()
    }
}
