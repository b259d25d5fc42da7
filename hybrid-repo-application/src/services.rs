//! 服务装配
//!
//! `RepoServices` 持有存储句柄、可选的事件分发器与健康检查参数：
//! 每个请求 / 逻辑操作通过 `begin()` 打开独立的工作单元；
//! 健康检查开启时由 `start_health_check()` 启动后台探测。
//!
use crate::config::{HealthCheckOptions, RepoConfig};
use crate::health::{ConnectionProbe, HealthCheckHandle, HealthCheckService};
use async_trait::async_trait;
use bon::Builder;
use hybrid_repo_domain::error::DomainResult;
use hybrid_repo_domain::eventing::DomainEventDispatcher;
use hybrid_repo_domain::persist::Store;
use hybrid_repo_domain::unit_of_work::UnitOfWork;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Builder)]
pub struct RepoServices {
    store: Arc<dyn Store>,
    dispatcher: Option<Arc<dyn DomainEventDispatcher>>,
    #[builder(default)]
    health: HealthCheckOptions,
}

impl RepoServices {
    /// 以校验后的配置与已建立的存储句柄装配
    pub fn from_config(
        config: &RepoConfig,
        store: Arc<dyn Store>,
        dispatcher: Option<Arc<dyn DomainEventDispatcher>>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            health: config.health,
        }
    }

    /// 打开新的工作单元
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::builder()
            .store(self.store.clone())
            .maybe_dispatcher(self.dispatcher.clone())
            .build()
    }

    /// 打开受取消令牌控制的工作单元
    pub fn begin_with_cancellation(&self, cancellation: CancellationToken) -> UnitOfWork {
        UnitOfWork::builder()
            .store(self.store.clone())
            .maybe_dispatcher(self.dispatcher.clone())
            .cancellation(cancellation)
            .build()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn health_options(&self) -> &HealthCheckOptions {
        &self.health
    }

    /// 健康检查开启时启动后台探测；关闭时返回 `None`
    pub fn start_health_check(&self) -> Option<HealthCheckHandle> {
        if !self.health.is_active() {
            tracing::debug!("health check inactive");
            return None;
        }
        let service = HealthCheckService::builder()
            .probe(Arc::new(self.clone()))
            .options(self.health)
            .build();
        Some(Arc::new(service).start())
    }
}

#[cfg(feature = "infra-sqlx")]
impl RepoServices {
    /// 按配置连接存储并装配
    pub async fn connect(
        config: &RepoConfig,
        dispatcher: Option<Arc<dyn DomainEventDispatcher>>,
    ) -> crate::error::AppResult<Self> {
        use crate::config::StorageProvider;
        use crate::error::AppError;
        use hybrid_repo_domain::persist::PgStore;

        match config.provider {
            StorageProvider::PostgreSql => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .connect(&config.connection_string)
                    .await
                    .map_err(|e| AppError::Infra(e.to_string()))?;
                let store = PgStore::new(pool).with_retry_on_failure(config.retry_on_failure);
                tracing::info!(provider = %config.provider, "store connected");
                Ok(Self::from_config(config, Arc::new(store), dispatcher))
            }
            other => Err(AppError::UnsupportedProvider {
                provider: format!("{other} (no backend compiled in)"),
            }),
        }
    }
}

// 每次探测使用新的工作单元
#[async_trait]
impl ConnectionProbe for RepoServices {
    async fn probe(&self) -> DomainResult<()> {
        let uow = self.begin();
        let result = uow.ping().await;
        uow.dispose();
        result
    }
}

impl fmt::Debug for RepoServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoServices")
            .field("has_dispatcher", &self.dispatcher.is_some())
            .field("health", &self.health)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthCheck, RepoSettings};
    use hybrid_repo_domain::persist::InMemoryStore;
    use std::time::Duration;

    fn services(store: &InMemoryStore, health: HealthCheckOptions) -> RepoServices {
        RepoServices::builder()
            .store(Arc::new(store.clone()))
            .health(health)
            .build()
    }

    #[tokio::test]
    async fn each_begin_opens_an_independent_unit_of_work() {
        let store = InMemoryStore::new();
        let services = services(&store, HealthCheckOptions::default());

        let first = services.begin();
        let second = services.begin();
        first.dispose();
        assert!(first.is_disposed());
        assert!(!second.is_disposed());
        second.ping().await.unwrap();
    }

    #[tokio::test]
    async fn health_check_only_starts_when_active() {
        let store = InMemoryStore::new();
        assert!(
            services(&store, HealthCheckOptions::default())
                .start_health_check()
                .is_none()
        );

        let active = HealthCheckOptions {
            mode: HealthCheck::Active,
            ..HealthCheckOptions::default()
        };
        let handle = services(&store, active).start_health_check().unwrap();
        handle.shutdown();
        handle.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn probe_reflects_store_connectivity() {
        let store = InMemoryStore::new();
        let services = services(&store, HealthCheckOptions::default());
        services.probe().await.unwrap();

        store.set_offline(true);
        assert!(services.probe().await.unwrap_err().is_store_failure());

        let service = HealthCheckService::builder()
            .probe(Arc::new(services.clone()))
            .options(HealthCheckOptions {
                base_delay: Duration::from_millis(10),
                ..HealthCheckOptions::default()
            })
            .build();
        assert!(!service.check_once().await);
        store.set_offline(false);
        assert!(service.check_once().await);
    }

    #[test]
    fn from_config_carries_health_options() {
        let config = RepoSettings::new("PostgreSQL")
            .with_connection_string("PostgresConnection", "postgres://pg")
            .with_health_check(HealthCheck::Active)
            .validate()
            .unwrap();
        let services = RepoServices::from_config(&config, Arc::new(InMemoryStore::new()), None);
        assert!(services.health_options().is_active());
        assert_eq!(services.health_options().interval, Duration::from_secs(30));
    }
}
