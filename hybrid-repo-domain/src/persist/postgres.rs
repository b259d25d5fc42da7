//! PostgreSQL 存储实现（特性 `infra-sqlx`）
//!
//! 所有实体以 JSONB 文档形式存放在同一张表中，表结构需由迁移工具预先创建：
//!
//! ```sql
//! CREATE TABLE hybrid_repo_entities (
//!     entity_type TEXT        NOT NULL,
//!     id          UUID        NOT NULL,
//!     seq         BIGSERIAL   NOT NULL,
//!     payload     JSONB       NOT NULL,
//!     PRIMARY KEY (entity_type, id)
//! );
//! ```
//!
//! `apply` 在单个事务中执行，连接类的瞬时错误按指数退避重试 `retry_on_failure` 次。
//!
use super::{RowChange, Store, StoredRow};
use crate::{
    entity::EntityId,
    error::{DomainError, DomainResult as Result},
};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use std::future::Future;
use std::time::Duration;

const DEFAULT_RETRY_ON_FAILURE: u32 = 5;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    retry_on_failure: u32,
    retry_base_delay: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry_on_failure: DEFAULT_RETRY_ON_FAILURE,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    /// 连接类瞬时错误的最大重试次数
    pub fn with_retry_on_failure(mut self, retries: u32) -> Self {
        self.retry_on_failure = retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < self.retry_on_failure => {
                    attempt += 1;
                    let delay = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        operation,
                        attempt,
                        max_retries = self.retry_on_failure,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn apply_once(&self, changes: &[RowChange]) -> std::result::Result<u64, ApplyError> {
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;

        for change in changes {
            let result = match change {
                RowChange::Insert(row) => {
                    sqlx::query(
                        "INSERT INTO hybrid_repo_entities (entity_type, id, payload) VALUES ($1, $2, $3)",
                    )
                    .bind(row.entity_type())
                    .bind(*row.id().as_uuid())
                    .bind(Json(row.payload()))
                    .execute(&mut *tx)
                    .await?
                }
                RowChange::Update(row) => {
                    sqlx::query(
                        "UPDATE hybrid_repo_entities SET payload = $3 WHERE entity_type = $1 AND id = $2",
                    )
                    .bind(row.entity_type())
                    .bind(*row.id().as_uuid())
                    .bind(Json(row.payload()))
                    .execute(&mut *tx)
                    .await?
                }
                RowChange::Delete { entity_type, id } => {
                    sqlx::query("DELETE FROM hybrid_repo_entities WHERE entity_type = $1 AND id = $2")
                        .bind(entity_type)
                        .bind(*id.as_uuid())
                        .execute(&mut *tx)
                        .await?
                }
            };

            if result.rows_affected() == 0 {
                // 事务随 tx 丢弃回滚
                return Err(ApplyError::Missing(format!(
                    "{} of missing row: {}/{}",
                    change.kind(),
                    change.entity_type(),
                    change.id()
                )));
            }
            affected += result.rows_affected();
        }

        // 提交请求已发出后出错时，服务端可能已落库，不能整批重放
        tx.commit().await.map_err(ApplyError::Commit)?;
        Ok(affected)
    }
}

#[derive(Debug)]
enum ApplyError {
    /// 事务提交前（开启事务或执行语句）的错误，事务已回滚
    Sql(sqlx::Error),
    /// 提交阶段的错误，结果未知
    Commit(sqlx::Error),
    Missing(String),
}

impl ApplyError {
    fn is_retryable(&self) -> bool {
        match self {
            ApplyError::Sql(err) => is_transient(err),
            ApplyError::Commit(_) | ApplyError::Missing(_) => false,
        }
    }
}

impl From<sqlx::Error> for ApplyError {
    fn from(err: sqlx::Error) -> Self {
        ApplyError::Sql(err)
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

fn decode_row(row: PgRow) -> Result<StoredRow> {
    let entity_type: String = row.try_get("entity_type")?;
    let id: uuid::Uuid = row.try_get("id")?;
    let payload: serde_json::Value = row.try_get("payload")?;
    Ok(StoredRow::builder()
        .entity_type(entity_type)
        .id(EntityId::from_uuid(id))
        .payload(payload)
        .build())
}

#[async_trait]
impl Store for PgStore {
    async fn fetch_all(&self, entity_type: &str) -> Result<Vec<StoredRow>> {
        let rows = self
            .with_retry("fetch_all", || {
                sqlx::query(
                    "SELECT entity_type, id, payload FROM hybrid_repo_entities WHERE entity_type = $1 ORDER BY seq",
                )
                .bind(entity_type)
                .fetch_all(&self.pool)
            })
            .await?;
        rows.into_iter().map(decode_row).collect()
    }

    async fn fetch(&self, entity_type: &str, id: &EntityId) -> Result<Option<StoredRow>> {
        let row = self
            .with_retry("fetch", || {
                sqlx::query(
                    "SELECT entity_type, id, payload FROM hybrid_repo_entities WHERE entity_type = $1 AND id = $2",
                )
                .bind(entity_type)
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
            })
            .await?;
        row.map(decode_row).transpose()
    }

    async fn apply(&self, changes: Vec<RowChange>) -> Result<u64> {
        if changes.is_empty() {
            return Ok(0);
        }

        let mut attempt = 0u32;
        loop {
            let err = match self.apply_once(&changes).await {
                Ok(affected) => return Ok(affected),
                Err(err) if err.is_retryable() && attempt < self.retry_on_failure => err,
                Err(ApplyError::Missing(reason)) => return Err(DomainError::store(reason)),
                Err(ApplyError::Commit(err)) => {
                    tracing::error!(error = %err, "transaction commit failed, outcome unknown");
                    return Err(err.into());
                }
                Err(ApplyError::Sql(err)) => return Err(err.into()),
            };
            attempt += 1;
            let delay = self.retry_base_delay * 2u32.saturating_pow(attempt - 1);
            tracing::warn!(
                operation = "apply",
                attempt,
                max_retries = self.retry_on_failure,
                delay_ms = delay.as_millis() as u64,
                error = ?err,
                "transient store failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
