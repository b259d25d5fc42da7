//! 弹性策略（resilience）
//!
//! - `RetryPolicy`：有界次数、指数退避的异步重试；
//! - `CircuitBreaker`：连续失败后熔断一段时间；
//! - `ResiliencePolicies`：对外 HTTP 调用与数据库访问的预设策略。
//!
mod circuit_breaker;
mod policies;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState, ResilienceError};
pub use policies::{ResiliencePolicies, is_transient_http_status};
pub use retry::RetryPolicy;
