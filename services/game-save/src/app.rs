//! 组件装配
//!
//! 只依赖端口 trait：生产环境注入 Redis/PostgreSQL 适配器，
//! 测试注入内存适配器。

use std::sync::Arc;

use save_common::Clock;
use save_config::FlushConfig;
use save_domain::{Characteristics, Currency, Stage};
use save_ports::{EntityRepositoryPort, FlushQueuePort};

use crate::application::{
    CacheFlushService, CacheManager, CacheToggle, CharacteristicsHandler, EntityCaches,
    EntityService, EventHandlerRegistry, FlushScheduler, FlushSchedulerConfig, FlushTarget,
    ReplaceHandler, UpdateEventConsumer,
};

/// 装配所需的全部端口
pub struct GameSavePorts {
    pub caches: EntityCaches,
    pub queue: Arc<dyn FlushQueuePort>,
    pub characteristics: Arc<dyn EntityRepositoryPort<Characteristics>>,
    pub currency: Arc<dyn EntityRepositoryPort<Currency>>,
    pub stage: Arc<dyn EntityRepositoryPort<Stage>>,
}

pub struct GameSaveApp {
    pub cache_manager: Arc<CacheManager>,
    pub characteristics: Arc<EntityService<Characteristics>>,
    pub currency: Arc<EntityService<Currency>>,
    pub stage: Arc<EntityService<Stage>>,
    pub consumer: Arc<UpdateEventConsumer>,
    pub flush_service: Arc<CacheFlushService>,
    pub scheduler: Arc<FlushScheduler>,
}

impl GameSaveApp {
    pub fn build(
        ports: GameSavePorts,
        flush: &FlushConfig,
        cache_enabled: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let toggle = CacheToggle::new(cache_enabled);
        let cache_manager = Arc::new(CacheManager::new(toggle.clone(), ports.caches.registry()));

        let characteristics = Arc::new(EntityService::new(
            ports.caches.characteristics.clone(),
            ports.characteristics,
            toggle.clone(),
        ));
        let currency = Arc::new(EntityService::new(
            ports.caches.currency.clone(),
            ports.currency,
            toggle.clone(),
        ));
        let stage = Arc::new(EntityService::new(
            ports.caches.stage.clone(),
            ports.stage,
            toggle.clone(),
        ));

        let registry = EventHandlerRegistry::new()
            .register(Arc::new(CharacteristicsHandler::new(characteristics.clone())))
            .register(Arc::new(ReplaceHandler::currency(currency.clone())))
            .register(Arc::new(ReplaceHandler::stage(stage.clone())));

        let consumer = Arc::new(UpdateEventConsumer::new(
            registry,
            ports.queue.clone(),
            toggle,
            clock.clone(),
            flush.debounce_window_ms,
        ));

        let targets: Vec<Arc<dyn FlushTarget>> =
            vec![characteristics.clone(), currency.clone(), stage.clone()];
        let flush_service = Arc::new(CacheFlushService::new(targets));

        let scheduler = Arc::new(FlushScheduler::new(
            ports.queue,
            flush_service.clone(),
            clock,
            FlushSchedulerConfig::from(flush),
        ));

        Self {
            cache_manager,
            characteristics,
            currency,
            stage,
            consumer,
            flush_service,
            scheduler,
        }
    }
}
