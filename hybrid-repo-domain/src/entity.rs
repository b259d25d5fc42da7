//! 实体（Entity）基础抽象
//!
//! - `EntityId`：构造时生成、不可变的唯一标识；
//! - `EntityBase`：基础实体契约（创建/更新时间、软删除标记、待分发领域事件队列）；
//! - `Entity`：仓储可管理的实体类型需实现的最小接口。
//!
//! 时间戳刷新、软删除与领域事件都是“具备基础实体契约”的实体才有的能力，
//! 未实现 `base()` 的实体不会被自动刷新时间戳，也不会参与事件分发。
//!
use crate::domain_event::{DomainEvent, DomainEvents};
use crate::query::Include;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// 实体唯一标识（UUID v7，按生成时间有序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for EntityId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// 基础实体契约
///
/// 持久化字段：`id`、`created_at`、`updated_at`、`is_deleted`；
/// 领域事件队列不参与序列化，由实体独占。
#[derive(Clone, Serialize, Deserialize)]
pub struct EntityBase {
    id: EntityId,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_deleted: bool,
    #[serde(skip)]
    domain_events: DomainEvents,
}

impl EntityBase {
    /// 生成新标识与创建时间
    pub fn new() -> Self {
        Self::with_id(EntityId::new())
    }

    pub fn with_id(id: EntityId) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            updated_at: None,
            is_deleted: false,
            domain_events: DomainEvents::default(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// 刷新最后更新时间
    ///
    /// 结果不早于创建时间，且严格晚于之前的更新时间（时钟精度不足时前进 1 微秒）。
    pub fn touch(&mut self) {
        let now = Utc::now().max(self.created_at);
        self.updated_at = Some(match self.updated_at {
            Some(previous) if now <= previous => previous + Duration::microseconds(1),
            _ => now,
        });
    }

    /// 标记为软删除，并在同一次变更中刷新更新时间
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.touch();
    }

    /// 显式撤销软删除（核心流程从不调用，需由业务代码主动写入）
    pub fn restore(&mut self) {
        self.is_deleted = false;
        self.touch();
    }

    pub fn domain_events(&self) -> &DomainEvents {
        &self.domain_events
    }

    pub fn add_domain_event<E: DomainEvent>(&mut self, event: E) {
        self.domain_events.push(Arc::new(event));
    }

    pub fn remove_domain_event(&mut self, event: &Arc<dyn DomainEvent>) -> bool {
        self.domain_events.remove(event)
    }

    pub fn clear_domain_events(&mut self) {
        self.domain_events.clear();
    }

    /// 快照并清空事件队列（先快照后清空）
    pub fn take_domain_events(&mut self) -> Vec<Arc<dyn DomainEvent>> {
        self.domain_events.take()
    }

    pub(crate) fn prepend_domain_events(&mut self, earlier: Vec<Arc<dyn DomainEvent>>) {
        if earlier.is_empty() {
            return;
        }
        let later = self.domain_events.take();
        // 调用方副本可能仍持有同一批事件，按引用去重
        let earlier = earlier
            .into_iter()
            .filter(|e| !later.iter().any(|l| Arc::ptr_eq(l, e)))
            .collect::<Vec<_>>();
        for event in earlier.into_iter().chain(later) {
            self.domain_events.push(event);
        }
    }
}

impl Default for EntityBase {
    fn default() -> Self {
        Self::new()
    }
}

// 仅比较持久化字段
impl PartialEq for EntityBase {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.created_at == other.created_at
            && self.updated_at == other.updated_at
            && self.is_deleted == other.is_deleted
    }
}

impl fmt::Debug for EntityBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBase")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("is_deleted", &self.is_deleted)
            .field("pending_events", &self.domain_events.len())
            .finish()
    }
}

/// 可由仓储管理的实体
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// 实体类型名（存储层按此分表）
    const TYPE: &'static str;

    fn id(&self) -> EntityId;

    /// 基础实体契约；返回 `None` 表示该实体类型不具备时间戳/软删除/事件能力
    fn base(&self) -> Option<&EntityBase> {
        None
    }

    fn base_mut(&mut self) -> Option<&mut EntityBase> {
        None
    }

    /// 默认的关联预加载（可被 `QueryOptions::ignore_auto_includes` 关闭）
    fn auto_includes() -> Vec<Include<Self>> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_base_has_identity_and_creation_time() {
        let a = EntityBase::new();
        let b = EntityBase::new();
        assert_ne!(a.id(), b.id());
        assert!(a.updated_at().is_none());
        assert!(!a.is_deleted());
        assert!(a.domain_events().is_empty());
    }

    #[test]
    fn touch_is_strictly_monotonic() {
        let mut base = EntityBase::new();
        let mut previous = None;
        for _ in 0..100 {
            base.touch();
            let current = base.updated_at().unwrap();
            assert!(current >= base.created_at());
            if let Some(p) = previous {
                assert!(current > p);
            }
            previous = Some(current);
        }
    }

    #[test]
    fn mark_deleted_sets_flag_and_touches() {
        let mut base = EntityBase::new();
        base.touch();
        let before = base.updated_at().unwrap();
        base.mark_deleted();
        assert!(base.is_deleted());
        assert!(base.updated_at().unwrap() > before);
    }

    #[test]
    fn equality_ignores_pending_events() {
        #[derive(Debug)]
        struct Ping;
        impl DomainEvent for Ping {
            fn event_type(&self) -> &str {
                "ping"
            }
            fn occurred_at(&self) -> DateTime<Utc> {
                Utc::now()
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let base = EntityBase::new();
        let mut with_event = base.clone();
        with_event.add_domain_event(Ping);
        assert_eq!(base, with_event);
    }

    #[test]
    fn serde_roundtrip_drops_events() {
        let mut base = EntityBase::new();
        base.touch();
        let json = serde_json::to_value(&base).unwrap();
        assert!(json.get("domain_events").is_none());
        let restored: EntityBase = serde_json::from_value(json).unwrap();
        assert_eq!(restored, base);
    }

    #[test]
    fn entity_id_parses_from_display() {
        let id = EntityId::new();
        let parsed: EntityId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<EntityId>().is_err());
    }
}
