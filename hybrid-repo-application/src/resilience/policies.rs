use super::{CircuitBreaker, RetryPolicy};
use crate::config::HealthCheckOptions;
use std::time::Duration;

/// 预设策略
pub struct ResiliencePolicies;

impl ResiliencePolicies {
    /// 对外 HTTP 调用：最多重试 5 次，间隔 2s、4s、8s、16s、32s
    pub fn http_retry() -> RetryPolicy {
        RetryPolicy::builder()
            .name("http")
            .max_retries(5)
            .base_delay(Duration::from_secs(2))
            .build()
    }

    /// 对外 HTTP 调用：连续 3 次失败后熔断 30 秒
    pub fn http_circuit_breaker() -> CircuitBreaker {
        CircuitBreaker::new("http", 3, Duration::from_secs(30))
    }

    /// 数据库访问：任何错误都重试，最多 5 次，间隔同 `http_retry`
    pub fn database_retry() -> RetryPolicy {
        RetryPolicy::builder()
            .name("database")
            .max_retries(5)
            .base_delay(Duration::from_secs(2))
            .build()
    }

    pub fn health_check_retry(options: &HealthCheckOptions) -> RetryPolicy {
        RetryPolicy::builder()
            .name("health-check")
            .max_retries(options.retries)
            .base_delay(options.base_delay)
            .build()
    }
}

/// 瞬时 HTTP 故障：5xx 与 408
pub fn is_transient_http_status(status: u16) -> bool {
    status >= 500 || status == 408
}
