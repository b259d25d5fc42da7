//! 启动配置
//!
//! `RepoSettings` 是可直接从 TOML 反序列化（或在代码中构造）的原始设置，
//! `validate()` 之后得到经过校验的 `RepoConfig`：
//! - 存储提供方名称不区分大小写，仅支持 `PostgreSQL` 与 `SQLServer`；
//! - 提供方决定读取哪个连接串（`PostgresConnection` / `SqlConnection`）；
//! - 健康检查默认关闭，开启时每 30 秒探测一次，失败重试 3 次（2s、4s、8s）。
//!
//! ```toml
//! provider = "PostgreSQL"
//! health_check = "Active"
//!
//! [connection_strings]
//! PostgresConnection = "postgres://app@localhost/app"
//! ```
//!
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RETRY_ON_FAILURE: u32 = 5;
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HEALTH_CHECK_RETRIES: u32 = 3;
pub const DEFAULT_HEALTH_CHECK_BASE_DELAY_MS: u64 = 2_000;

/// 健康检查开关
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthCheck {
    /// 周期性探测存储连通性
    #[serde(alias = "active", alias = "ACTIVE")]
    Active,
    /// 不探测
    #[default]
    #[serde(alias = "inactive", alias = "INACTIVE")]
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    PostgreSql,
    SqlServer,
}

impl StorageProvider {
    /// 该提供方使用的连接串名称
    pub const fn connection_name(&self) -> &'static str {
        match self {
            StorageProvider::PostgreSql => "PostgresConnection",
            StorageProvider::SqlServer => "SqlConnection",
        }
    }
}

impl FromStr for StorageProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.eq_ignore_ascii_case("postgresql") {
            Ok(StorageProvider::PostgreSql)
        } else if name.eq_ignore_ascii_case("sqlserver") {
            Ok(StorageProvider::SqlServer)
        } else {
            Err(AppError::UnsupportedProvider {
                provider: s.to_string(),
            })
        }
    }
}

impl fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageProvider::PostgreSql => "PostgreSQL",
            StorageProvider::SqlServer => "SQLServer",
        })
    }
}

/// 原始设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSettings {
    pub provider: String,
    #[serde(default)]
    pub connection_strings: BTreeMap<String, String>,
    #[serde(default = "default_retry_on_failure")]
    pub retry_on_failure: u32,
    #[serde(default)]
    pub health_check: HealthCheck,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    #[serde(default = "default_health_check_retries")]
    pub health_check_retries: u32,
    #[serde(default = "default_health_check_base_delay_ms")]
    pub health_check_base_delay_ms: u64,
}

fn default_retry_on_failure() -> u32 {
    DEFAULT_RETRY_ON_FAILURE
}
fn default_health_check_interval_secs() -> u64 {
    DEFAULT_HEALTH_CHECK_INTERVAL_SECS
}
fn default_health_check_retries() -> u32 {
    DEFAULT_HEALTH_CHECK_RETRIES
}
fn default_health_check_base_delay_ms() -> u64 {
    DEFAULT_HEALTH_CHECK_BASE_DELAY_MS
}

impl RepoSettings {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            connection_strings: BTreeMap::new(),
            retry_on_failure: DEFAULT_RETRY_ON_FAILURE,
            health_check: HealthCheck::Inactive,
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            health_check_retries: DEFAULT_HEALTH_CHECK_RETRIES,
            health_check_base_delay_ms: DEFAULT_HEALTH_CHECK_BASE_DELAY_MS,
        }
    }

    pub fn with_connection_string(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.connection_strings.insert(name.into(), value.into());
        self
    }

    pub fn with_health_check(mut self, health_check: HealthCheck) -> Self {
        self.health_check = health_check;
        self
    }

    pub fn from_toml_str(source: &str) -> AppResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// 校验并解析；不支持的提供方在启动时即失败
    pub fn validate(&self) -> AppResult<RepoConfig> {
        let provider: StorageProvider = self.provider.parse()?;
        let name = provider.connection_name();
        let connection_string = self
            .connection_strings
            .get(name)
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .ok_or_else(|| {
                AppError::Config(format!("connection string {name} is missing for {provider}"))
            })?;

        if self.health_check_interval_secs == 0 {
            return Err(AppError::Config(
                "health_check_interval_secs must be > 0".into(),
            ));
        }

        Ok(RepoConfig {
            provider,
            connection_string,
            retry_on_failure: self.retry_on_failure,
            health: HealthCheckOptions {
                mode: self.health_check,
                interval: Duration::from_secs(self.health_check_interval_secs),
                retries: self.health_check_retries,
                base_delay: Duration::from_millis(self.health_check_base_delay_ms),
            },
        })
    }
}

/// 健康检查参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckOptions {
    pub mode: HealthCheck,
    pub interval: Duration,
    /// 首次探测失败后的重试次数
    pub retries: u32,
    /// 第 n 次重试前等待 `base_delay * 2^(n-1)`
    pub base_delay: Duration,
}

impl HealthCheckOptions {
    pub fn is_active(&self) -> bool {
        self.mode == HealthCheck::Active
    }
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            mode: HealthCheck::Inactive,
            interval: Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            retries: DEFAULT_HEALTH_CHECK_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_HEALTH_CHECK_BASE_DELAY_MS),
        }
    }
}

/// 校验后的配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub provider: StorageProvider,
    pub connection_string: String,
    pub retry_on_failure: u32,
    pub health: HealthCheckOptions,
}
