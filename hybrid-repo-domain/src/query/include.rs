//! 关联预加载（Include）
//!
//! 每个导航属性实现 `Navigation<T>`：给定一批已物化的实体，批量读取关联实体并回填。
//! 关联读取经由 `RelationLoader`，不会被工作单元跟踪。
//!
use super::Predicate;
use crate::{
    entity::{Entity, EntityId},
    error::{DomainError, DomainResult},
    persist::Store,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Navigation<T: Entity>: Send + Sync {
    /// 关联名（同名关联在一次查询中只加载一次）
    fn name(&self) -> &str;

    async fn load(&self, entities: &mut [T], loader: &RelationLoader) -> DomainResult<()>;
}

pub type Include<T> = Arc<dyn Navigation<T>>;

/// 预加载期间读取其他实体类型的只读通道
#[derive(Clone)]
pub struct RelationLoader {
    store: Arc<dyn Store>,
    cancellation: CancellationToken,
}

impl RelationLoader {
    pub(crate) fn new(store: Arc<dyn Store>, cancellation: CancellationToken) -> Self {
        Self {
            store,
            cancellation,
        }
    }

    pub async fn load<R: Entity>(&self, predicate: &Predicate<R>) -> DomainResult<Vec<R>> {
        predicate.require("include")?;
        self.ensure_not_cancelled()?;

        let rows = self.store.fetch_all(R::TYPE).await?;
        let mut out = Vec::new();
        for row in rows {
            let entity: R = row.decode()?;
            if predicate.matches(&entity) {
                out.push(entity);
            }
        }
        Ok(out)
    }

    pub async fn load_by_ids<R: Entity>(&self, ids: &[EntityId]) -> DomainResult<Vec<R>> {
        let wanted: HashSet<EntityId> = ids.iter().copied().collect();
        self.load(&Predicate::new(move |r: &R| wanted.contains(&r.id())))
            .await
    }

    fn ensure_not_cancelled(&self) -> DomainResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(DomainError::Cancelled {
                operation: "include",
            });
        }
        Ok(())
    }
}

/// 合并强制预加载与默认预加载，按名称去重（先出现者优先）
pub(crate) fn merge_includes<T: Entity>(
    forced: &[Include<T>],
    ignore_auto_includes: bool,
) -> Vec<Include<T>> {
    let auto = if ignore_auto_includes {
        Vec::new()
    } else {
        T::auto_includes()
    };

    let mut seen = HashSet::new();
    forced
        .iter()
        .cloned()
        .chain(auto)
        .filter(|nav| seen.insert(nav.name().to_string()))
        .collect()
}
