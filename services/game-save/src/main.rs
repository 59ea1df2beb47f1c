//! Game Save Service - 写回缓存刷新服务入口

use std::sync::Arc;
use std::time::Duration;

use game_save::app::{GameSaveApp, GameSavePorts};
use game_save::application::EntityCaches;
use game_save::infrastructure::{GameStreamConsumer, StreamConsumerConfig};
use save_adapter_postgres::{PgCharacteristicsRepository, PgCurrencyRepository, PgStageRepository};
use save_adapter_redis::{RedisCache, RedisEventSource, RedisFlushQueue};
use save_bootstrap::{Infrastructure, ShutdownController, drain_tasks, init_runtime, shutdown_signal};
use save_common::SystemClock;
use save_config::AppConfig;
use save_domain::{Characteristics, Currency, GameMetadata, GameSession, Stage};
use save_ports::CacheKind;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load("config")?;
    init_runtime(&config)?;

    let infra = Infrastructure::from_config(config).await?;
    let config = infra.config().clone();
    let pool = infra.postgres_pool();
    let redis = infra.redis_connection_manager();
    let keys = infra.key_space();

    // 组装 Redis 缓存（每种实体一个）
    let caches = EntityCaches {
        characteristics: Arc::new(RedisCache::<Characteristics>::new(
            redis.clone(),
            keys.clone(),
            CacheKind::Characteristics,
            Duration::from_secs(config.cache.characteristics_ttl_secs),
        )),
        currency: Arc::new(RedisCache::<Currency>::new(
            redis.clone(),
            keys.clone(),
            CacheKind::Currency,
            Duration::from_secs(config.cache.currency_ttl_secs),
        )),
        stage: Arc::new(RedisCache::<Stage>::new(
            redis.clone(),
            keys.clone(),
            CacheKind::Stage,
            Duration::from_secs(config.cache.stage_ttl_secs),
        )),
        metadata: Arc::new(RedisCache::<GameMetadata>::new(
            redis.clone(),
            keys.clone(),
            CacheKind::Metadata,
            Duration::from_secs(config.cache.metadata_ttl_secs),
        )),
        session: Arc::new(RedisCache::<GameSession>::new(
            redis.clone(),
            keys.clone(),
            CacheKind::Session,
            Duration::from_secs(config.cache.session_ttl_secs),
        )),
    };

    // 组装写回队列与仓储
    let ports = GameSavePorts {
        caches,
        queue: Arc::new(RedisFlushQueue::new(redis, &keys)),
        characteristics: Arc::new(PgCharacteristicsRepository::new(pool.clone())),
        currency: Arc::new(PgCurrencyRepository::new(pool.clone())),
        stage: Arc::new(PgStageRepository::new(pool)),
    };
    let app = GameSaveApp::build(
        ports,
        &config.flush,
        config.cache.enabled,
        Arc::new(SystemClock),
    );
    info!(
        cache_enabled = config.cache.enabled,
        debounce_window_ms = config.flush.debounce_window_ms,
        "Game save components initialized"
    );

    // 上次进程留下的缓存规模，决定恢复刷新的工作量
    match app.cache_manager.entry_counts().await {
        Ok(counts) => {
            for (kind, count) in counts {
                info!(kind = %kind, count, "Cached entries at startup");
            }
        }
        Err(e) => warn!(error = %e, "Failed to count cached entries"),
    }

    if config.flush.recover_on_startup {
        // 恢复上次进程遗留的待刷新与处理中条目
        if let Err(e) = app.scheduler.flush_all().await {
            error!(error = %e, "Startup recovery flush failed");
        }
    }

    let source = Arc::new(RedisEventSource::new(
        infra.stream_connection_manager(),
        keys.stream_key(&config.stream.key),
        config.stream.consumer_group.clone(),
        config.stream.consumer_name.clone(),
    ));
    let stream_consumer = Arc::new(GameStreamConsumer::new(
        source,
        app.consumer.clone(),
        StreamConsumerConfig::from(&config.stream),
    ));

    let shutdown = ShutdownController::new();
    let scheduler_handle = app.scheduler.clone().start(shutdown.token());
    let consumer_handle = stream_consumer.start(shutdown.token());

    shutdown_signal().await;
    shutdown.shutdown();

    // 先停消费者，调度器在剩余时间内完成进行中的周期
    drain_tasks(
        vec![
            ("stream consumer", consumer_handle),
            ("flush scheduler", scheduler_handle),
        ],
        config.flush.shutdown_timeout(),
    )
    .await;

    info!("Game save service stopped");
    Ok(())
}
