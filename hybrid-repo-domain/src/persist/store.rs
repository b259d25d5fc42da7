//! 存储抽象（Store）
//!
//! 工作单元与仓储只通过该接口访问底层数据库连接。
//!
use super::{RowChange, StoredRow};
use crate::{entity::EntityId, error::DomainResult};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Store: Send + Sync {
    /// 读取某实体类型的全部行（按插入顺序）
    async fn fetch_all(&self, entity_type: &str) -> DomainResult<Vec<StoredRow>>;

    async fn fetch(&self, entity_type: &str, id: &EntityId) -> DomainResult<Option<StoredRow>>;

    /// 原子地应用一批变更，返回受影响行数
    ///
    /// 任一变更失败（插入重复键、更新/删除不存在的行、连接错误）时整批不生效。
    async fn apply(&self, changes: Vec<RowChange>) -> DomainResult<u64>;

    /// 最小存活探测
    async fn ping(&self) -> DomainResult<()>;
}

#[async_trait]
impl<T> Store for Arc<T>
where
    T: Store + ?Sized,
{
    async fn fetch_all(&self, entity_type: &str) -> DomainResult<Vec<StoredRow>> {
        (**self).fetch_all(entity_type).await
    }

    async fn fetch(&self, entity_type: &str, id: &EntityId) -> DomainResult<Option<StoredRow>> {
        (**self).fetch(entity_type, id).await
    }

    async fn apply(&self, changes: Vec<RowChange>) -> DomainResult<u64> {
        (**self).apply(changes).await
    }

    async fn ping(&self) -> DomainResult<()> {
        (**self).ping().await
    }
}
