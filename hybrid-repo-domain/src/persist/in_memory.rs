//! 内存版存储（InMemoryStore）
//!
//! 满足 `Store` 协议的轻量实现：
//! - 每个实体类型一张有序表，读取按插入顺序返回；
//! - `apply` 在副本上执行整批变更，全部成功后才替换，保证全有或全无；
//! - 提供故障注入（下一次提交失败、离线），便于测试提交失败与健康检查路径。
//!
use super::{RowChange, Store, StoredRow};
use crate::{
    entity::EntityId,
    error::{DomainError, DomainResult as Result},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Tables>,
    fail_next_apply: Mutex<Option<String>>,
    offline: AtomicBool,
    apply_calls: AtomicUsize,
}

#[derive(Clone, Default)]
struct Tables {
    next_seq: u64,
    by_type: HashMap<String, Table>,
}

#[derive(Clone, Default)]
struct Table {
    rows: BTreeMap<u64, StoredRow>,
    index: HashMap<EntityId, u64>,
}

impl Tables {
    fn apply_one(&mut self, change: RowChange) -> Result<()> {
        match change {
            RowChange::Insert(row) => {
                let seq = self.next_seq;
                let table = self.by_type.entry(row.entity_type().to_string()).or_default();
                if table.index.contains_key(&row.id()) {
                    return Err(DomainError::store(format!(
                        "duplicate key: {}/{}",
                        row.entity_type(),
                        row.id()
                    )));
                }
                table.index.insert(row.id(), seq);
                table.rows.insert(seq, row);
                self.next_seq += 1;
            }
            RowChange::Update(row) => {
                let seq = self
                    .by_type
                    .get(row.entity_type())
                    .and_then(|t| t.index.get(&row.id()).copied())
                    .ok_or_else(|| {
                        DomainError::store(format!(
                            "update of missing row: {}/{}",
                            row.entity_type(),
                            row.id()
                        ))
                    })?;
                if let Some(table) = self.by_type.get_mut(row.entity_type()) {
                    table.rows.insert(seq, row);
                }
            }
            RowChange::Delete { entity_type, id } => {
                let removed = self.by_type.get_mut(&entity_type).and_then(|t| {
                    let seq = t.index.remove(&id)?;
                    t.rows.remove(&seq)
                });
                if removed.is_none() {
                    return Err(DomainError::store(format!(
                        "delete of missing row: {entity_type}/{id}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让下一次 `apply` 以给定原因失败（仅生效一次）
    pub fn fail_next_apply(&self, reason: impl Into<String>) {
        *lock(&self.inner.fail_next_apply) = Some(reason.into());
    }

    /// 模拟连接中断：离线时所有操作都返回存储错误
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// `apply` 被调用的次数（含失败）
    pub fn apply_calls(&self) -> usize {
        self.inner.apply_calls.load(Ordering::SeqCst)
    }

    pub fn row_count(&self, entity_type: &str) -> usize {
        lock(&self.inner.tables)
            .by_type
            .get(entity_type)
            .map_or(0, |t| t.rows.len())
    }

    fn ensure_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(DomainError::store("connection refused: store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn fetch_all(&self, entity_type: &str) -> Result<Vec<StoredRow>> {
        self.ensure_online()?;
        let tables = lock(&self.inner.tables);
        Ok(tables
            .by_type
            .get(entity_type)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch(&self, entity_type: &str, id: &EntityId) -> Result<Option<StoredRow>> {
        self.ensure_online()?;
        let tables = lock(&self.inner.tables);
        Ok(tables.by_type.get(entity_type).and_then(|t| {
            let seq = t.index.get(id)?;
            t.rows.get(seq).cloned()
        }))
    }

    async fn apply(&self, changes: Vec<RowChange>) -> Result<u64> {
        self.inner.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        if let Some(reason) = lock(&self.inner.fail_next_apply).take() {
            return Err(DomainError::store(reason));
        }

        let mut tables = lock(&self.inner.tables);
        let mut staged = tables.clone();
        let mut affected = 0u64;
        for change in changes {
            staged.apply_one(change)?;
            affected += 1;
        }
        *tables = staged;
        Ok(affected)
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_online()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
