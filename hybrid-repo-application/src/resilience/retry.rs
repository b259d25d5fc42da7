use bon::Builder;
use std::borrow::Cow;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// 指数退避重试策略
///
/// 首次调用失败后最多重试 `max_retries` 次，第 n 次重试前等待
/// `base_delay * 2^(n-1)`（可用 `max_delay` 封顶）。每次重试与最终放弃都会记录日志。
#[derive(Debug, Clone, Builder)]
pub struct RetryPolicy {
    #[builder(into, default = Cow::Borrowed("retry"))]
    name: Cow<'static, str>,
    #[builder(default = 3)]
    max_retries: u32,
    #[builder(default = Duration::from_secs(1))]
    base_delay: Duration,
    max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 第 `attempt` 次重试（从 1 开始）前的等待时长
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// 对任何错误都重试
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_if(|_| true, op).await
    }

    /// 只重试 `should_retry` 认可的错误，其余错误立即返回
    pub async fn execute_if<T, E, F, Fut, P>(&self, should_retry: P, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(policy = %self.name, retries = attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_retries && should_retry(&err) => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        policy = %self.name,
                        attempt,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if attempt > 0 {
                        tracing::debug!(policy = %self.name, retries = attempt, error = %err, "giving up");
                    }
                    return Err(err);
                }
            }
        }
    }
}
