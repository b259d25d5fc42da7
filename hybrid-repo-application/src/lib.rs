//! 混合仓储的宿主侧组件（hybrid-repo-application）
//!
//! - `config`：启动设置、存储提供方选择与健康检查参数；
//! - `resilience`：重试与熔断策略；
//! - `health`：存储连通性的后台探测；
//! - `services`：装配存储、分发器与健康检查，按需打开工作单元；
//! - `telemetry`：tracing 日志初始化。
//!
pub mod config;
pub mod error;
pub mod health;
pub mod resilience;
pub mod services;
pub mod telemetry;

pub use config::{HealthCheck, RepoConfig, RepoSettings, StorageProvider};
pub use error::{AppError, AppResult};
pub use services::RepoServices;
