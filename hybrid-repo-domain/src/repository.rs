//! 仓储（Repository）
//!
//! 绑定到单个实体类型与单个事务上下文的读写门面，只能通过 `UnitOfWork::repository`
//! 获得。写操作只在内存中暂存（不访问存储），在 `UnitOfWork::commit` 时按程序顺序落库；
//! 读操作要么返回延迟执行的 `Query<T>`，要么是显式 `async` 的即时读取。
//!
//! 需要条件的操作若收到缺失的条件（`Predicate::default()`），在任何 I/O 之前返回
//! `DomainError::InvalidArgument`。“未找到”以 `None` 表示，不是错误。
//!
use crate::{
    entity::Entity,
    error::{DomainError, DomainResult},
    query::{Include, Predicate, Query, QueryOptions},
    unit_of_work::DataContext,
};
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub struct Repository<T: Entity> {
    context: Arc<DataContext>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Repository<T> {
    pub(crate) fn new(context: Arc<DataContext>) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    /// 完整的查询入口，不过滤软删除的实体
    pub fn entities(&self) -> DomainResult<Query<T>> {
        self.query(None)
    }

    /// 第一个匹配的实体
    pub async fn find_one(
        &self,
        predicate: Predicate<T>,
        options: Option<QueryOptions>,
    ) -> DomainResult<Option<T>> {
        self.find(predicate, options)?.first().await
    }

    /// 延迟执行的匹配序列
    pub fn find(
        &self,
        predicate: Predicate<T>,
        options: Option<QueryOptions>,
    ) -> DomainResult<Query<T>> {
        predicate.require("find")?;
        Ok(self.query(options)?.filter(predicate))
    }

    pub fn get_all(&self, options: Option<QueryOptions>) -> DomainResult<Query<T>> {
        self.query(options)
    }

    pub fn get_all_where(
        &self,
        predicate: Predicate<T>,
        options: Option<QueryOptions>,
    ) -> DomainResult<Query<T>> {
        self.find(predicate, options)
    }

    /// 第 `page` 页（从 1 开始），每页 `size` 条；立即物化
    pub async fn get_all_paged(&self, page: usize, size: usize) -> DomainResult<Vec<T>> {
        self.get_all_paged_with(page, size, &[]).await
    }

    /// 分页读取并强制预加载给定关联
    pub async fn get_all_paged_with(
        &self,
        page: usize,
        size: usize,
        includes: &[Include<T>],
    ) -> DomainResult<Vec<T>> {
        if page < 1 {
            return Err(DomainError::invalid_argument(format!(
                "page number must be >= 1, got {page}"
            )));
        }
        if size < 1 {
            return Err(DomainError::invalid_argument(format!(
                "page size must be > 0, got {size}"
            )));
        }

        let skip = (page - 1).checked_mul(size).ok_or_else(|| {
            DomainError::invalid_argument(format!("page {page} of size {size} is out of range"))
        })?;
        self.get_all_with(includes)?
            .skip(skip)
            .take(size)
            .to_list()
            .await
    }

    /// 全部实体，强制预加载给定关联（延迟执行）
    pub fn get_all_with(&self, includes: &[Include<T>]) -> DomainResult<Query<T>> {
        Ok(includes
            .iter()
            .cloned()
            .fold(self.query(None)?, |query, include| query.include(include)))
    }

    /// 暂存插入
    pub fn add(&self, entity: T) -> DomainResult<()> {
        self.context.ensure_live()?;
        self.context.tracker().stage_insert(entity)
    }

    /// 暂存一批插入；任一实体已被跟踪或批内标识重复时整批不暂存
    pub fn add_range(&self, entities: impl IntoIterator<Item = T>) -> DomainResult<()> {
        self.context.ensure_live()?;
        let entities: Vec<T> = entities.into_iter().collect();

        let mut tracker = self.context.tracker();
        let mut seen = HashSet::with_capacity(entities.len());
        for entity in &entities {
            if !seen.insert(entity.id()) || tracker.state_of::<T>(entity.id()).is_some() {
                return Err(DomainError::invalid_argument(format!(
                    "{} {} is already tracked by this unit of work",
                    T::TYPE,
                    entity.id()
                )));
            }
        }
        for entity in entities {
            tracker.stage_insert(entity)?;
        }
        Ok(())
    }

    /// 暂存更新；具备基础实体契约的实体同时刷新更新时间
    pub fn update(&self, mut entity: T) -> DomainResult<()> {
        self.context.ensure_live()?;
        if let Some(base) = entity.base_mut() {
            base.touch();
        }
        self.context.tracker().stage_update(entity)
    }

    /// 暂存物理删除
    pub fn delete(&self, entity: T) -> DomainResult<()> {
        self.context.ensure_live()?;
        self.context.tracker().stage_delete(entity)
    }

    /// 先求值 `find(predicate)`，再为每个匹配暂存物理删除；返回匹配数
    pub async fn delete_where(&self, predicate: Predicate<T>) -> DomainResult<usize> {
        let matches = self.find(predicate, None)?.to_list().await?;
        let count = matches.len();
        {
            let mut tracker = self.context.tracker();
            for entity in matches {
                tracker.stage_delete(entity)?;
            }
        }
        tracing::debug!(entity_type = T::TYPE, count, "staged deletes");
        Ok(count)
    }

    /// 暂存软删除：置删除标记、刷新更新时间、作为更新落库
    pub fn soft_delete(&self, mut entity: T) -> DomainResult<()> {
        self.context.ensure_live()?;
        Self::mark_deleted(&mut entity)?;
        self.context.tracker().stage_update(entity)
    }

    /// 求值条件并软删除每个匹配，作为一批更新暂存；返回匹配数
    pub async fn soft_delete_where(&self, predicate: Predicate<T>) -> DomainResult<usize> {
        let mut matches = self.find(predicate, None)?.to_list().await?;
        for entity in &mut matches {
            Self::mark_deleted(entity)?;
        }

        let count = matches.len();
        {
            let mut tracker = self.context.tracker();
            for entity in &matches {
                tracker.ensure_updatable::<T>(entity.id())?;
            }
            for entity in matches {
                tracker.stage_update(entity)?;
            }
        }
        tracing::debug!(entity_type = T::TYPE, count, "staged soft deletes");
        Ok(count)
    }

    pub async fn any(&self, predicate: Predicate<T>) -> DomainResult<bool> {
        predicate.require("any")?;
        self.query(None)?.filter(predicate).any().await
    }

    pub async fn count(&self, predicate: Predicate<T>) -> DomainResult<usize> {
        predicate.require("count")?;
        self.query(None)?.filter(predicate).count().await
    }

    /// 第一个匹配；无匹配时记录诊断日志并返回 `None`
    pub async fn find_async(&self, predicate: Predicate<T>) -> DomainResult<Option<T>> {
        self.find_async_with(predicate, &[]).await
    }

    pub async fn find_async_with(
        &self,
        predicate: Predicate<T>,
        includes: &[Include<T>],
    ) -> DomainResult<Option<T>> {
        predicate.require("find_async")?;
        let label = predicate.to_string();
        let found = self.get_all_with(includes)?.filter(predicate).first().await?;
        if found.is_none() {
            tracing::debug!(entity_type = T::TYPE, predicate = %label, "no entity matched");
        }
        Ok(found)
    }

    fn query(&self, options: Option<QueryOptions>) -> DomainResult<Query<T>> {
        self.context.ensure_live()?;
        Ok(Query::new(
            self.context.clone(),
            QueryOptions::resolve(options),
        ))
    }

    fn mark_deleted(entity: &mut T) -> DomainResult<()> {
        let id = entity.id();
        match entity.base_mut() {
            Some(base) => {
                base.mark_deleted();
                Ok(())
            }
            None => Err(DomainError::invalid_argument(format!(
                "{} {id} does not support soft delete",
                T::TYPE
            ))),
        }
    }
}

impl<T: Entity> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity_type", &T::TYPE)
            .field("live", &self.context.is_live())
            .finish()
    }
}
