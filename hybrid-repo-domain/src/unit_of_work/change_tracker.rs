//! 变更跟踪器
//!
//! 工作单元内的身份映射（按实体类型 + 标识）与按程序顺序记录的待提交变更日志。
//! 跟踪器持有每个被跟踪实体的权威副本，待分发的领域事件只存在于该副本中；
//! 对外返回的实体都是去掉事件队列的克隆。
//!
use crate::{
    domain_event::{DomainEvent, EntityEvents},
    entity::{Entity, EntityId},
    error::{DomainError, DomainResult},
    persist::{RowChange, StoredRow},
};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct EntryKey {
    type_id: TypeId,
    id: EntityId,
}

impl EntryKey {
    pub(crate) fn of<T: Entity>(id: EntityId) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            id,
        }
    }
}

trait AnyEntity: Send + Sync {
    fn entity_type(&self) -> &'static str;
    fn entity_id(&self) -> EntityId;
    fn take_events(&mut self) -> Vec<Arc<dyn DomainEvent>>;
    fn reload_from(&mut self, row: &StoredRow) -> DomainResult<()>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Entity> AnyEntity for T {
    fn entity_type(&self) -> &'static str {
        T::TYPE
    }

    fn entity_id(&self) -> EntityId {
        self.id()
    }

    fn take_events(&mut self) -> Vec<Arc<dyn DomainEvent>> {
        self.base_mut()
            .map(|b| b.take_domain_events())
            .unwrap_or_default()
    }

    fn reload_from(&mut self, row: &StoredRow) -> DomainResult<()> {
        *self = row.decode::<T>()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct TrackedEntry {
    state: EntryState,
    entity: Box<dyn AnyEntity>,
}

/// 去掉事件队列后的克隆
pub(crate) fn detached<T: Entity>(entity: &T) -> T {
    let mut copy = entity.clone();
    if let Some(base) = copy.base_mut() {
        base.clear_domain_events();
    }
    copy
}

#[derive(Default)]
pub(crate) struct ChangeTracker {
    entries: HashMap<EntryKey, TrackedEntry>,
    order: Vec<EntryKey>,
    staged: Vec<RowChange>,
}

impl ChangeTracker {
    pub(crate) fn state_of<T: Entity>(&self, id: EntityId) -> Option<EntryState> {
        self.entries.get(&EntryKey::of::<T>(id)).map(|e| e.state)
    }

    /// 被跟踪的副本（去掉事件队列）
    pub(crate) fn resolve<T: Entity>(&self, id: EntityId) -> Option<T> {
        self.entries
            .get(&EntryKey::of::<T>(id))
            .and_then(|e| e.entity.as_any().downcast_ref::<T>())
            .map(detached)
    }

    /// 首次从存储读到的实体以 Unchanged 状态纳入跟踪；已跟踪的保持不变
    pub(crate) fn track_unchanged<T: Entity>(&mut self, entity: &T) {
        let key = EntryKey::of::<T>(entity.id());
        if self.entries.contains_key(&key) {
            return;
        }
        self.insert_entry(key, EntryState::Unchanged, Box::new(detached(entity)));
    }

    pub(crate) fn stage_insert<T: Entity>(&mut self, entity: T) -> DomainResult<()> {
        let key = EntryKey::of::<T>(entity.id());
        if self.entries.contains_key(&key) {
            return Err(DomainError::invalid_argument(format!(
                "{} {} is already tracked by this unit of work",
                T::TYPE,
                entity.id()
            )));
        }
        let row = StoredRow::encode(&entity)?;
        self.staged.push(RowChange::Insert(row));
        self.insert_entry(key, EntryState::Added, Box::new(entity));
        Ok(())
    }

    /// 已暂存删除的实体不可再更新
    pub(crate) fn ensure_updatable<T: Entity>(&self, id: EntityId) -> DomainResult<()> {
        match self.state_of::<T>(id) {
            Some(EntryState::Deleted) => Err(DomainError::InvalidState {
                reason: format!("{} {} is staged for deletion", T::TYPE, id),
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn stage_update<T: Entity>(&mut self, mut entity: T) -> DomainResult<()> {
        self.ensure_updatable::<T>(entity.id())?;
        let key = EntryKey::of::<T>(entity.id());
        let next_state = match self.entries.get(&key).map(|e| e.state) {
            Some(EntryState::Added) => EntryState::Added,
            _ => EntryState::Modified,
        };
        let row = StoredRow::encode(&entity)?;
        self.carry_events(key, &mut entity);
        self.staged.push(RowChange::Update(row));
        self.replace_entry(key, next_state, Box::new(entity));
        Ok(())
    }

    pub(crate) fn stage_delete<T: Entity>(&mut self, mut entity: T) -> DomainResult<()> {
        let key = EntryKey::of::<T>(entity.id());
        if self.entries.get(&key).map(|e| e.state) == Some(EntryState::Deleted) {
            return Ok(());
        }
        self.carry_events(key, &mut entity);
        self.staged.push(RowChange::Delete {
            entity_type: T::TYPE.to_string(),
            id: entity.id(),
        });
        self.replace_entry(key, EntryState::Deleted, Box::new(entity));
        Ok(())
    }

    pub(crate) fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }

    pub(crate) fn drain_staged(&mut self) -> Vec<RowChange> {
        std::mem::take(&mut self.staged)
    }

    /// 按首次跟踪顺序快照并清空每个实体的待分发事件（含已删除的实体）
    pub(crate) fn take_pending_events(&mut self) -> Vec<EntityEvents> {
        let mut batches = Vec::new();
        for key in &self.order {
            if let Some(entry) = self.entries.get_mut(key) {
                let events = entry.entity.take_events();
                if !events.is_empty() {
                    batches.push(EntityEvents::new(
                        entry.entity.entity_type(),
                        entry.entity.entity_id(),
                        events,
                    ));
                }
            }
        }
        batches
    }

    /// 提交成功后：分离已删除的实体，其余标记为 Unchanged
    pub(crate) fn accept_all(&mut self) {
        self.entries.retain(|_, e| e.state != EntryState::Deleted);
        for entry in self.entries.values_mut() {
            entry.state = EntryState::Unchanged;
        }
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
    }

    /// 回滚需要重新读取的实体：(键, 实体类型, 标识)
    pub(crate) fn tracked(&self) -> Vec<(EntryKey, &'static str, EntityId)> {
        self.order
            .iter()
            .filter_map(|k| {
                self.entries
                    .get(k)
                    .map(|e| (*k, e.entity.entity_type(), e.entity.entity_id()))
            })
            .collect()
    }

    /// 用存储中的当前值覆盖被跟踪副本；存储中已不存在的实体被分离
    pub(crate) fn reload(&mut self, key: EntryKey, row: Option<&StoredRow>) -> DomainResult<()> {
        match row {
            Some(row) => {
                if let Some(entry) = self.entries.get_mut(&key) {
                    entry.entity.reload_from(row)?;
                    entry.state = EntryState::Unchanged;
                }
            }
            None => {
                self.entries.remove(&key);
                self.order.retain(|k| *k != key);
            }
        }
        Ok(())
    }

    pub(crate) fn discard_staged(&mut self) {
        self.staged.clear();
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.staged.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    // 已跟踪副本上尚未分发的事件排在新事件之前
    fn carry_events<T: Entity>(&mut self, key: EntryKey, entity: &mut T) {
        let Some(existing) = self
            .entries
            .get_mut(&key)
            .and_then(|e| e.entity.as_any_mut().downcast_mut::<T>())
        else {
            return;
        };
        let earlier = existing
            .base_mut()
            .map(|b| b.take_domain_events())
            .unwrap_or_default();
        if let Some(base) = entity.base_mut() {
            base.prepend_domain_events(earlier);
        }
    }

    fn insert_entry(&mut self, key: EntryKey, state: EntryState, entity: Box<dyn AnyEntity>) {
        self.order.push(key);
        self.entries.insert(key, TrackedEntry { state, entity });
    }

    fn replace_entry(&mut self, key: EntryKey, state: EntryState, entity: Box<dyn AnyEntity>) {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.state = state;
                entry.entity = entity;
            }
            None => self.insert_entry(key, state, entity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityBase;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        #[serde(flatten)]
        base: EntityBase,
        text: String,
    }

    impl Entity for Note {
        const TYPE: &'static str = "note";
        fn id(&self) -> EntityId {
            self.base.id()
        }
        fn base(&self) -> Option<&EntityBase> {
            Some(&self.base)
        }
        fn base_mut(&mut self) -> Option<&mut EntityBase> {
            Some(&mut self.base)
        }
    }

    #[derive(Debug)]
    struct Edited(&'static str);
    impl DomainEvent for Edited {
        fn event_type(&self) -> &str {
            self.0
        }
        fn occurred_at(&self) -> DateTime<Utc> {
            Utc::now()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn note(text: &str) -> Note {
        Note {
            base: EntityBase::new(),
            text: text.into(),
        }
    }

    #[test]
    fn staged_log_keeps_program_order() {
        let mut tracker = ChangeTracker::default();
        let a = note("a");
        let b = note("b");
        tracker.stage_insert(a.clone()).unwrap();
        tracker.stage_insert(b.clone()).unwrap();
        tracker.stage_delete(a.clone()).unwrap();

        let kinds: Vec<&str> = tracker.drain_staged().iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec!["insert", "insert", "delete"]);
        assert!(!tracker.has_staged());
        assert_eq!(tracker.state_of::<Note>(a.id()), Some(EntryState::Deleted));
        assert_eq!(tracker.state_of::<Note>(b.id()), Some(EntryState::Added));
    }

    #[test]
    fn double_insert_is_rejected() {
        let mut tracker = ChangeTracker::default();
        let a = note("a");
        tracker.stage_insert(a.clone()).unwrap();
        assert!(matches!(
            tracker.stage_insert(a),
            Err(DomainError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn events_survive_update_and_are_drained_once() {
        let mut tracker = ChangeTracker::default();
        let mut a = note("a");
        a.base.add_domain_event(Edited("first"));
        tracker.stage_insert(a.clone()).unwrap();

        let mut copy = tracker.resolve::<Note>(a.id()).unwrap();
        assert!(copy.base.domain_events().is_empty());
        copy.base.add_domain_event(Edited("second"));
        tracker.stage_update(copy).unwrap();

        let batches = tracker.take_pending_events();
        assert_eq!(batches.len(), 1);
        let types: Vec<&str> = batches[0].events().iter().map(|e| e.event_type()).collect();
        assert_eq!(types, vec!["first", "second"]);
        assert!(tracker.take_pending_events().is_empty());
    }

    #[test]
    fn accept_all_detaches_deleted() {
        let mut tracker = ChangeTracker::default();
        let a = note("a");
        let b = note("b");
        tracker.track_unchanged(&a);
        tracker.stage_insert(b.clone()).unwrap();
        tracker.stage_delete(a.clone()).unwrap();
        tracker.accept_all();

        assert_eq!(tracker.state_of::<Note>(a.id()), None);
        assert_eq!(tracker.state_of::<Note>(b.id()), Some(EntryState::Unchanged));
        assert_eq!(tracker.tracked().len(), 1);
    }

    #[test]
    fn reload_overwrites_or_detaches() {
        let mut tracker = ChangeTracker::default();
        let mut a = note("a");
        let stored = StoredRow::encode(&a).unwrap();
        tracker.track_unchanged(&a);
        a.text = "edited".into();
        tracker.stage_update(a.clone()).unwrap();

        let key = EntryKey::of::<Note>(a.id());
        tracker.reload(key, Some(&stored)).unwrap();
        assert_eq!(tracker.resolve::<Note>(a.id()).unwrap().text, "a");
        assert_eq!(tracker.state_of::<Note>(a.id()), Some(EntryState::Unchanged));

        tracker.reload(key, None).unwrap();
        assert_eq!(tracker.len(), 0);
    }
}
