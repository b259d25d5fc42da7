//! 领域层统一错误定义
//!
//! 聚焦参数校验、存储、事件分发与工作单元生命周期等最小必要集合。
//! “未找到”不是错误：读取接口以 `Option` 表达无结果。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 调用方契约 ---
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("unit of work has been disposed")]
    Disposed,
    #[error("operation cancelled: {operation}")]
    Cancelled { operation: &'static str },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 存储 ---
    #[error("store error: {reason}")]
    Store { reason: String },

    // --- 提交后的事件分发 ---
    #[error(
        "dispatch failed after commit: entity={entity_id}, event={event_type}, subscriber={subscriber}, reason={reason}"
    )]
    Dispatch {
        entity_id: String,
        event_type: String,
        subscriber: String,
        reason: String,
    },
}

impl DomainError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        DomainError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        DomainError::Store {
            reason: reason.into(),
        }
    }

    /// 是否为存储层故障（约束冲突、连接中断、超时等）
    pub fn is_store_failure(&self) -> bool {
        matches!(self, DomainError::Store { .. })
    }

    /// 是否为提交成功之后的事件分发失败
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(self, DomainError::Dispatch { .. })
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx/uuid 等错误转换为 DomainError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Store {
            reason: err.to_string(),
        }
    }
}

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::InvalidArgument {
            reason: err.to_string(),
        }
    }
}
