//! save-config - 配置加载库

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Secret<String>,
    /// 所有键的公共前缀，例如 `staging` -> `staging:game-save:flush:pending`
    #[serde(default)]
    pub key_prefix: Option<String>,
}

/// 实体缓存配置
///
/// TTL 为 0 表示不过期。
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub characteristics_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub currency_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub stage_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub metadata_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            characteristics_ttl_secs: default_ttl_secs(),
            currency_ttl_secs: default_ttl_secs(),
            stage_ttl_secs: default_ttl_secs(),
            metadata_ttl_secs: default_ttl_secs(),
            session_ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    3600
}

/// 刷新管道配置
#[derive(Debug, Clone, Deserialize)]
pub struct FlushConfig {
    /// 最后一次变更后等待多久才允许刷新
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,
    /// 调度器轮询周期
    #[serde(default = "default_check_interval_seconds")]
    pub check_interval_seconds: u64,
    /// 关闭时等待进行中周期完成的上限
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// 处理集合中停留超过该时长的条目会被重新放回待刷新集合；未设置则不处理
    #[serde(default)]
    pub processing_timeout_ms: Option<u64>,
    /// 启动时是否刷新所有遗留条目
    #[serde(default = "default_true")]
    pub recover_on_startup: bool,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: default_debounce_window_ms(),
            check_interval_seconds: default_check_interval_seconds(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            processing_timeout_ms: None,
            recover_on_startup: true,
        }
    }
}

impl FlushConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_debounce_window_ms() -> u64 {
    5000
}

fn default_check_interval_seconds() -> u64 {
    5
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

/// 事件流配置
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_key")]
    pub key: String,
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_block_ms")]
    pub block_ms: usize,
    /// pending 消息空闲多久后重新认领
    #[serde(default = "default_reclaim_idle_ms")]
    pub reclaim_idle_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            key: default_stream_key(),
            consumer_group: default_consumer_group(),
            consumer_name: default_consumer_name(),
            batch_size: default_batch_size(),
            block_ms: default_block_ms(),
            reclaim_idle_ms: default_reclaim_idle_ms(),
        }
    }
}

fn default_stream_key() -> String {
    "game-save-events".to_string()
}

fn default_consumer_group() -> String {
    "game-save-cache".to_string()
}

fn default_consumer_name() -> String {
    "game-save-1".to_string()
}

fn default_batch_size() -> usize {
    50
}

fn default_block_ms() -> usize {
    2000
}

fn default_reclaim_idle_ms() -> u64 {
    60_000
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Prometheus 抓取端点监听地址，例如 `0.0.0.0:9100`；未设置则只记录不导出
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub flush: FlushConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 优先级：`default.toml` < `<APP_ENV>.toml` < `APP_` 前缀环境变量（`__` 分隔层级）
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP_").split("__"));

        Self::from_figment(figment)
    }

    /// 从任意 figment 提取并校验
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.flush.check_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "flush.check_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.stream.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "stream.batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
