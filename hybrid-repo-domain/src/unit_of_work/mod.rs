//! 工作单元（unit_of_work）
//!
//! - `UnitOfWork`：一次业务操作的事务边界，负责仓储缓存、提交、回滚与释放；
//! - 事务上下文与变更跟踪器为内部实现，仓储通过共享的上下文暂存变更。
//!
mod change_tracker;
mod context;
#[allow(clippy::module_inception)]
mod unit_of_work;

pub(crate) use change_tracker::detached;
pub(crate) use context::DataContext;
pub use unit_of_work::{UnitOfWork, UnitOfWorkState};
