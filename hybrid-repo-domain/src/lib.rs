//! 混合仓储数据访问层（hybrid-repo-domain）
//!
//! 位于应用代码与关系型存储之间的通用数据访问层：
//! - 实体（`entity`）与领域事件（`domain_event`）建模；
//! - 查询选项、可组合条件、延迟查询与关联预加载（`query`）；
//! - 按实体类型划分的仓储门面（`repository`）；
//! - 工作单元（`unit_of_work`）：暂存变更、原子提交、回滚与释放；
//! - 提交成功后的领域事件分发（`eventing`）；
//! - 存储协议及其内存 / PostgreSQL 实现（`persist`）。
//!
//! 典型用法：
//! 1. 用 `#[entity]` 定义实体，用 `#[domain_event]` 定义事件；
//! 2. 以存储句柄（和可选的分发器）构建 `UnitOfWork`；
//! 3. 通过 `uow.repository::<T>()` 读取与暂存变更；
//! 4. `uow.commit().await` 落库并分发事件，最后 `dispose`（或直接丢弃）。
//!
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod eventing;
pub mod persist;
pub mod query;
pub mod repository;
pub mod unit_of_work;

pub use chrono;

// 允许在本 crate 内部通过 ::hybrid_repo_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::hybrid_repo_domain 路径。
extern crate self as hybrid_repo_domain;
