//! 基础设施资源管理
//!
//! PostgreSQL 连接池与 Redis 连接。事件流阻塞读取使用单独的 Redis 连接，
//! 避免阻塞缓存与队列命令。

use redis::aio::ConnectionManager;
use save_adapter_postgres::{PostgresConfig, check_connection as check_postgres, create_pool};
use save_adapter_redis::{KeySpace, check_connection as check_redis, create_connection_manager};
use save_config::AppConfig;
use save_errors::{AppError, AppResult};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tracing::info;

use crate::retry::{RetryConfig, with_retry};

/// 基础设施资源容器
pub struct Infrastructure {
    config: AppConfig,
    postgres_pool: PgPool,
    redis_conn: ConnectionManager,
    stream_conn: ConnectionManager,
}

impl Infrastructure {
    /// 从配置创建基础设施资源（带重试）
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let retry_config = RetryConfig::default();

        let pg_config = PostgresConfig::new(config.database.url.expose_secret())
            .with_max_connections(config.database.max_connections);
        let postgres_pool = with_retry(&retry_config, "PostgreSQL connection", || {
            let cfg = pg_config.clone();
            async move {
                let pool = create_pool(&cfg).await?;
                check_postgres(&pool).await?;
                Ok::<_, AppError>(pool)
            }
        })
        .await?;
        info!(
            max_connections = config.database.max_connections,
            "PostgreSQL connection pool created"
        );

        let redis_url = config.redis.url.clone();
        let redis_conn = with_retry(&retry_config, "Redis connection", || {
            let url = redis_url.expose_secret().clone();
            async move {
                let mut conn = create_connection_manager(&url).await?;
                check_redis(&mut conn).await?;
                Ok::<_, AppError>(conn)
            }
        })
        .await?;
        let stream_conn = with_retry(&retry_config, "Redis stream connection", || {
            let url = redis_url.expose_secret().clone();
            async move {
                let mut conn = create_connection_manager(&url).await?;
                check_redis(&mut conn).await?;
                Ok::<_, AppError>(conn)
            }
        })
        .await?;
        info!("Redis connections created");

        Ok(Self {
            config,
            postgres_pool,
            redis_conn,
            stream_conn,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn postgres_pool(&self) -> PgPool {
        self.postgres_pool.clone()
    }

    /// 缓存与写回队列共用的连接
    pub fn redis_connection_manager(&self) -> ConnectionManager {
        self.redis_conn.clone()
    }

    /// 事件流专用连接
    pub fn stream_connection_manager(&self) -> ConnectionManager {
        self.stream_conn.clone()
    }

    pub fn key_space(&self) -> KeySpace {
        KeySpace::new(self.config.redis.key_prefix.clone())
    }
}
