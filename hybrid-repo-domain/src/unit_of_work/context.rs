use super::change_tracker::ChangeTracker;
use crate::{
    error::{DomainError, DomainResult},
    persist::Store,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

/// 事务上下文：一个工作单元独占的存储句柄、变更跟踪器与取消令牌
///
/// 仓储只持有该上下文的共享引用；上下文被释放后，所有操作返回 `DomainError::Disposed`。
/// 跟踪器的锁从不跨越 `.await` 持有。
pub(crate) struct DataContext {
    store: RwLock<Option<Arc<dyn Store>>>,
    tracker: Mutex<ChangeTracker>,
    cancellation: CancellationToken,
}

impl DataContext {
    pub(crate) fn new(store: Arc<dyn Store>, cancellation: CancellationToken) -> Self {
        Self {
            store: RwLock::new(Some(store)),
            tracker: Mutex::new(ChangeTracker::default()),
            cancellation,
        }
    }

    pub(crate) fn store(&self) -> DomainResult<Arc<dyn Store>> {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DomainError::Disposed)
    }

    pub(crate) fn ensure_live(&self) -> DomainResult<()> {
        self.store().map(|_| ())
    }

    pub(crate) fn is_live(&self) -> bool {
        self.store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn check_cancelled(&self, operation: &'static str) -> DomainResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(DomainError::Cancelled { operation });
        }
        Ok(())
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn tracker(&self) -> MutexGuard<'_, ChangeTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 释放存储句柄并丢弃跟踪状态；返回本次调用是否真正执行了释放
    pub(crate) fn release(&self) -> bool {
        let released = self
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if released {
            self.tracker().clear();
        }
        released
    }
}
