//! 工作单元（UnitOfWork）
//!
//! 一个工作单元独占一个事务上下文，按实体类型缓存仓储，
//! 把仓储上暂存的全部变更在 `commit` 时作为一个原子批次写入存储，
//! 写入成功后再把各实体上排队的领域事件交给分发器。
//!
use super::DataContext;
use crate::{
    entity::Entity,
    error::{DomainError, DomainResult},
    eventing::DomainEventDispatcher,
    persist::Store,
    repository::Repository,
};
use bon::bon;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    Open,
    Committing,
    Disposed,
}

pub struct UnitOfWork {
    context: Arc<DataContext>,
    repositories: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    dispatcher: Option<Arc<dyn DomainEventDispatcher>>,
    state: Mutex<UnitOfWorkState>,
}

#[bon]
impl UnitOfWork {
    /// 打开工作单元
    ///
    /// - `store`：事务上下文使用的存储句柄；
    /// - `dispatcher`：可选，缺省时提交后不分发事件（事件继续留在实体上）；
    /// - `cancellation`：可选，触发后读取与提交在访问存储前返回 `Cancelled`。
    #[builder]
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Option<Arc<dyn DomainEventDispatcher>>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            context: Arc::new(DataContext::new(store, cancellation.unwrap_or_default())),
            repositories: DashMap::new(),
            dispatcher,
            state: Mutex::new(UnitOfWorkState::Open),
        }
    }
}

impl UnitOfWork {
    pub fn state(&self) -> UnitOfWorkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == UnitOfWorkState::Disposed
    }

    /// 取得实体类型 `T` 的仓储；同一工作单元内对同一类型总是返回同一实例
    pub fn repository<T: Entity>(&self) -> DomainResult<Arc<Repository<T>>> {
        self.context.ensure_live()?;

        let erased = self
            .repositories
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                Arc::new(Repository::<T>::new(self.context.clone())) as Arc<dyn Any + Send + Sync>
            })
            .value()
            .clone();

        erased
            .downcast::<Repository<T>>()
            .map_err(|_| DomainError::InvalidState {
                reason: format!("repository cache holds a foreign type for {}", T::TYPE),
            })
    }

    /// 提交全部暂存变更
    ///
    /// 返回是否至少影响了一行。存储失败时暂存的变更与跟踪状态被丢弃，
    /// 返回 `DomainError::Store`，分发器不会被调用。
    pub async fn commit(&self) -> DomainResult<bool> {
        self.transition(UnitOfWorkState::Open, UnitOfWorkState::Committing, "commit")?;
        let result = self.flush_and_dispatch().await;
        self.finish_commit();
        result
    }

    /// 丢弃暂存变更，并把每个被跟踪实体恢复为存储中的当前值
    ///
    /// 存储中已不存在（或从未写入）的实体不再被跟踪；被恢复的实体上未分发的事件随之丢弃。
    pub async fn rollback(&self) -> DomainResult<()> {
        self.ensure_open("rollback")?;
        let store = self.context.store()?;
        self.context.check_cancelled("rollback")?;

        let tracked = {
            let mut tracker = self.context.tracker();
            tracker.discard_staged();
            tracker.tracked()
        };

        let total = tracked.len();
        for (key, entity_type, id) in tracked {
            let row = store.fetch(entity_type, &id).await?;
            self.context.tracker().reload(key, row.as_ref())?;
        }

        tracing::info!(entities = total, "unit of work rolled back");
        Ok(())
    }

    /// 释放事务上下文（幂等）；暂存但未提交的变更被丢弃
    pub fn dispose(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == UnitOfWorkState::Disposed {
                return;
            }
            *state = UnitOfWorkState::Disposed;
        }

        if self.context.release() {
            tracing::debug!(
                repositories = self.repositories.len(),
                "unit of work disposed"
            );
        }
    }

    /// 最小存活探测（健康检查使用）
    pub async fn ping(&self) -> DomainResult<()> {
        self.context.store()?.ping().await
    }

    /// 当前被跟踪的实体数
    pub fn tracked_entities(&self) -> usize {
        self.context.tracker().len()
    }

    pub fn has_pending_changes(&self) -> bool {
        self.context.tracker().has_staged()
    }

    async fn flush_and_dispatch(&self) -> DomainResult<bool> {
        let store = self.context.store()?;
        self.context.check_cancelled("commit")?;

        let changes = self.context.tracker().drain_staged();
        let staged = changes.len();
        let rows = if changes.is_empty() {
            0
        } else {
            match store.apply(changes).await {
                Ok(rows) => rows,
                Err(err) => {
                    self.context.tracker().clear();
                    tracing::error!(
                        changes = staged,
                        error = %err,
                        "commit failed, staged changes discarded"
                    );
                    return Err(err);
                }
            }
        };

        let batches = {
            let mut tracker = self.context.tracker();
            let batches = match self.dispatcher {
                Some(_) => tracker.take_pending_events(),
                None => Vec::new(),
            };
            tracker.accept_all();
            batches
        };

        tracing::info!(changes = staged, rows, "unit of work committed");

        if let Some(dispatcher) = &self.dispatcher {
            if !batches.is_empty() {
                let events: usize = batches.iter().map(|b| b.len()).sum();
                dispatcher.dispatch_and_clear(batches).await?;
                tracing::debug!(events, "domain events dispatched");
            }
        }

        Ok(rows > 0)
    }

    fn transition(
        &self,
        from: UnitOfWorkState,
        to: UnitOfWorkState,
        operation: &str,
    ) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            s if s == from => {
                *state = to;
                Ok(())
            }
            UnitOfWorkState::Disposed => Err(DomainError::Disposed),
            other => Err(DomainError::InvalidState {
                reason: format!("{operation} while unit of work is {other:?}"),
            }),
        }
    }

    fn ensure_open(&self, operation: &str) -> DomainResult<()> {
        match self.state() {
            UnitOfWorkState::Open => Ok(()),
            UnitOfWorkState::Disposed => Err(DomainError::Disposed),
            other => Err(DomainError::InvalidState {
                reason: format!("{operation} while unit of work is {other:?}"),
            }),
        }
    }

    fn finish_commit(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == UnitOfWorkState::Committing {
            *state = UnitOfWorkState::Open;
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("state", &self.state())
            .field("repositories", &self.repositories.len())
            .field("has_dispatcher", &self.dispatcher.is_some())
            .finish()
    }
}
