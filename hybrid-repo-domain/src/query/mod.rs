//! 查询（query）
//!
//! - `QueryOptions`：控制读取结果是否被跟踪、是否忽略默认预加载；
//! - `Predicate` / `Specification`：可组合的过滤条件（规约模式）；
//! - `Navigation` / `Include`：关联实体的批量预加载；
//! - `Query`：延迟执行的查询构建器，只有显式物化（`to_list/first/count/any`）才会访问存储。
//!
mod include;
mod options;
mod predicate;
#[allow(clippy::module_inception)]
mod query;

pub use include::{Include, Navigation, RelationLoader};
pub use options::QueryOptions;
pub use predicate::{AndSpecification, NotSpecification, OrSpecification, Predicate, Specification};
pub use query::Query;
