use super::DomainEvent;
use crate::entity::EntityId;
use std::sync::Arc;

/// 单个实体在一次提交中被取出的事件快照
///
/// 生成时实体上的队列已被清空，事件按原插入顺序排列。
#[derive(Debug, Clone)]
pub struct EntityEvents {
    entity_type: &'static str,
    entity_id: EntityId,
    events: Vec<Arc<dyn DomainEvent>>,
}

impl EntityEvents {
    pub fn new(
        entity_type: &'static str,
        entity_id: EntityId,
        events: Vec<Arc<dyn DomainEvent>>,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            events,
        }
    }

    pub fn entity_type(&self) -> &'static str {
        self.entity_type
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn events(&self) -> &[Arc<dyn DomainEvent>] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Arc<dyn DomainEvent>> {
        self.events
    }
}
