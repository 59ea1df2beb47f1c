//! 应用层

pub mod cache_manager;
pub mod caches;
pub mod consumer;
pub mod entity_service;
pub mod flush_service;
pub mod handlers;
pub mod scheduler;

pub use cache_manager::{CacheManager, CacheToggle};
pub use caches::{CacheInvalidation, EntityCaches};
pub use consumer::UpdateEventConsumer;
pub use entity_service::{CacheSync, EntityService};
pub use flush_service::{CacheFlushService, FlushOutcome, FlushReport, FlushTarget};
pub use handlers::{
    CharacteristicsHandler, EventHandler, EventHandlerRegistry, HandlerOutcome, ReplaceHandler,
};
pub use scheduler::{CycleSummary, FlushScheduler, FlushSchedulerConfig};
