//! 持久化（persist）
//!
//! 定义工作单元与底层存储之间的最小协议：
//! - `Store`：按实体类型读取、原子地应用一批变更、存活探测；
//! - `StoredRow` / `RowChange`：以 JSON 文档表示的行与变更；
//! - `InMemoryStore`：测试与本地开发用的内存实现；
//! - `PgStore`（特性 `infra-sqlx`）：基于 sqlx 的 PostgreSQL 实现。
//!
//! 查询规划、SQL 生成与模式迁移不在本模块范围内。
//!
mod in_memory;
#[cfg(feature = "infra-sqlx")]
mod postgres;
mod store;
mod stored_row;

pub use in_memory::InMemoryStore;
#[cfg(feature = "infra-sqlx")]
pub use postgres::PgStore;
pub use store::Store;
pub use stored_row::{RowChange, StoredRow};
