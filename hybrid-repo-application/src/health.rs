//! 存储健康检查
//!
//! 后台任务按固定间隔探测存储连通性：
//! - 每次探测都在重试策略下执行（首次失败后重试 `retries` 次，指数退避）；
//! - 每次尝试都使用新的工作单元，与请求处理互不干扰；
//! - 重试耗尽时记录错误日志并等待下一个周期，从不让宿主进程崩溃；
//! - 通过 `HealthCheckHandle` 关闭与等待，通过 `HealthStatus` 观察最近结果。
//!
use crate::config::HealthCheckOptions;
use crate::resilience::ResiliencePolicies;
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, Utc};
use hybrid_repo_domain::error::{DomainError, DomainResult};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// 单次连通性探测
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn probe(&self) -> DomainResult<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub checks: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.last_success.is_some() && self.consecutive_failures == 0
    }
}

/// 最近一次探测结果（可跨任务共享）
#[derive(Debug, Clone, Default)]
pub struct HealthStatus {
    inner: Arc<Mutex<HealthSnapshot>>,
}

impl HealthStatus {
    pub fn snapshot(&self) -> HealthSnapshot {
        *self.lock()
    }

    fn record_success(&self) {
        let mut snapshot = self.lock();
        snapshot.checks += 1;
        snapshot.consecutive_failures = 0;
        snapshot.last_success = Some(Utc::now());
    }

    fn record_failure(&self) {
        let mut snapshot = self.lock();
        snapshot.checks += 1;
        snapshot.consecutive_failures = snapshot.consecutive_failures.saturating_add(1);
        snapshot.last_failure = Some(Utc::now());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HealthSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Builder)]
pub struct HealthCheckService {
    probe: Arc<dyn ConnectionProbe>,
    #[builder(default)]
    options: HealthCheckOptions,
    #[builder(default)]
    status: HealthStatus,
}

impl HealthCheckService {
    pub fn status(&self) -> HealthStatus {
        self.status.clone()
    }

    pub fn options(&self) -> &HealthCheckOptions {
        &self.options
    }

    /// 执行一次带重试的探测，返回存储是否可达
    pub async fn check_once(&self) -> bool {
        let policy = ResiliencePolicies::health_check_retry(&self.options);
        tracing::info!("testing store connection");

        match policy
            .execute_if(DomainError::is_store_failure, || self.probe.probe())
            .await
        {
            Ok(()) => {
                tracing::info!("store is reachable");
                self.status.record_success();
                true
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    retries = self.options.retries,
                    "store connection failed"
                );
                self.status.record_failure();
                false
            }
        }
    }

    /// 在当前 tokio 运行时中启动后台循环（立即探测一次，此后每个间隔一次）
    pub fn start(self: Arc<Self>) -> HealthCheckHandle {
        let token = CancellationToken::new();
        let status = self.status();
        let interval = self.options.interval;
        tracing::info!(
            interval_secs = interval.as_secs(),
            retries = self.options.retries,
            "health check started"
        );

        let task = {
            let token = token.clone();
            tokio::spawn(async move {
                let mut ticker = time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = self.check_once() => {}
                            }
                        }
                    }
                }
                tracing::info!("health check stopped");
            })
        };

        HealthCheckHandle {
            token,
            task: Some(task),
            status,
        }
    }
}

pub struct HealthCheckHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    status: HealthStatus,
}

impl HealthCheckHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn status(&self) -> HealthStatus {
        self.status.clone()
    }

    /// 等待后台任务结束（需先 `shutdown`）
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "health check task aborted");
            }
        }
    }
}

impl Drop for HealthCheckHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
