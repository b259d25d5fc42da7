//! 延迟查询（Query）
//!
//! 仓储的读取接口返回 `Query<T>`：只记录过滤条件、排序、分页与预加载，
//! 直到调用 `to_list` / `first` / `count` / `any` 时才访问存储。每次物化都会重新求值。
//!
//! 跟踪模式下，已被工作单元跟踪的实体以跟踪副本为准（条件也在跟踪副本上求值），
//! 首次读到的实体以 Unchanged 状态纳入跟踪；`no_tracking` 模式直接返回存储中的值。
//!
use super::include::{Include, RelationLoader, merge_includes};
use super::{Predicate, QueryOptions};
use crate::{
    entity::Entity,
    error::DomainResult,
    unit_of_work::{DataContext, detached},
};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

pub struct Query<T: Entity> {
    context: Arc<DataContext>,
    predicate: Predicate<T>,
    includes: Vec<Include<T>>,
    options: QueryOptions,
    ordering: Vec<Comparator<T>>,
    skip: usize,
    take: Option<usize>,
    exclude_deleted: bool,
}

impl<T: Entity> Query<T> {
    pub(crate) fn new(context: Arc<DataContext>, options: QueryOptions) -> Self {
        Self {
            context,
            predicate: Predicate::always(),
            includes: Vec::new(),
            options,
            ordering: Vec::new(),
            skip: 0,
            take: None,
            exclude_deleted: false,
        }
    }

    /// 追加过滤条件（与已有条件取 AND）；缺失的条件在物化时报 `InvalidArgument`
    pub fn filter(mut self, predicate: Predicate<T>) -> Self {
        self.predicate = self.predicate.and(predicate);
        self
    }

    /// 按键升序；多次调用时后者作为次级排序键
    pub fn order_by<K, F>(self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.push_order(Arc::new(move |a: &T, b: &T| key(a).cmp(&key(b))))
    }

    pub fn order_by_desc<K, F>(self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.push_order(Arc::new(move |a: &T, b: &T| key(b).cmp(&key(a))))
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.take = Some(n);
        self
    }

    /// 强制预加载（不受 `ignore_auto_includes` 影响）
    pub fn include(mut self, navigation: Include<T>) -> Self {
        self.includes.push(navigation);
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// 排除已软删除的实体（默认包含）
    pub fn exclude_soft_deleted(mut self) -> Self {
        self.exclude_deleted = true;
        self
    }

    pub fn options(&self) -> QueryOptions {
        self.options
    }

    pub async fn to_list(&self) -> DomainResult<Vec<T>> {
        let mut entities = self.evaluate("to_list").await?;
        Self::page(&mut entities, self.skip, self.take);
        self.finish(entities).await
    }

    pub async fn first(&self) -> DomainResult<Option<T>> {
        let mut entities = self.evaluate("first").await?;
        let take = self.take.map_or(1, |t| t.min(1));
        Self::page(&mut entities, self.skip, Some(take));
        Ok(self.finish(entities).await?.into_iter().next())
    }

    pub async fn count(&self) -> DomainResult<usize> {
        let mut entities = self.evaluate("count").await?;
        Self::page(&mut entities, self.skip, self.take);
        Ok(entities.len())
    }

    pub async fn any(&self) -> DomainResult<bool> {
        Ok(self.count().await? > 0)
    }

    fn push_order(mut self, cmp: Comparator<T>) -> Self {
        self.ordering.push(cmp);
        self
    }

    // 读取、解析跟踪副本、过滤、排序（分页与预加载由调用方完成）
    async fn evaluate(&self, operation: &'static str) -> DomainResult<Vec<T>> {
        self.predicate.require(operation)?;
        let store = self.context.store()?;
        self.context.check_cancelled(operation)?;

        let rows = store.fetch_all(T::TYPE).await?;
        let mut entities = Vec::with_capacity(rows.len());
        {
            let tracker = self.context.tracker();
            for row in &rows {
                let tracked = if self.options.is_no_tracking() {
                    None
                } else {
                    tracker.resolve::<T>(row.id())
                };
                let entity = match tracked {
                    Some(entity) => entity,
                    None => row.decode::<T>()?,
                };
                if self.exclude_deleted && entity.base().is_some_and(|b| b.is_deleted()) {
                    continue;
                }
                if self.predicate.matches(&entity) {
                    entities.push(entity);
                }
            }
        }

        if !self.ordering.is_empty() {
            entities.sort_by(|a, b| {
                self.ordering
                    .iter()
                    .map(|cmp| cmp(a, b))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        Ok(entities)
    }

    fn page(entities: &mut Vec<T>, skip: usize, take: Option<usize>) {
        if skip > 0 {
            entities.drain(..skip.min(entities.len()));
        }
        if let Some(take) = take {
            entities.truncate(take);
        }
    }

    // 先登记跟踪再预加载，跟踪副本不含关联数据
    async fn finish(&self, entities: Vec<T>) -> DomainResult<Vec<T>> {
        if !self.options.is_no_tracking() {
            let mut tracker = self.context.tracker();
            for entity in &entities {
                tracker.track_unchanged(entity);
            }
        }

        let mut entities: Vec<T> = entities.iter().map(detached).collect();
        let includes = merge_includes(&self.includes, self.options.is_ignore_auto_includes());
        if !entities.is_empty() && !includes.is_empty() {
            let loader = RelationLoader::new(
                self.context.store()?,
                self.context.cancellation().clone(),
            );
            for navigation in &includes {
                self.context.check_cancelled("include")?;
                navigation.load(&mut entities, &loader).await?;
            }
        }
        Ok(entities.iter().map(detached).collect())
    }
}

impl<T: Entity> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            predicate: self.predicate.clone(),
            includes: self.includes.clone(),
            options: self.options,
            ordering: self.ordering.clone(),
            skip: self.skip,
            take: self.take,
            exclude_deleted: self.exclude_deleted,
        }
    }
}

impl<T: Entity> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("entity_type", &T::TYPE)
            .field("predicate", &self.predicate)
            .field(
                "includes",
                &self.includes.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .field("ordering", &self.ordering.len())
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("exclude_soft_deleted", &self.exclude_deleted)
            .finish()
    }
}
