//! 更新事件处理器
//!
//! 每种事件类型一个处理器。处理器先完整解码负载，再写入；
//! 解码失败不会产生任何副作用。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use save_domain::{
    Characteristics, CharacteristicsUpdate, Currency, GameSaveEvent, GameSaveEventType, Stage,
};
use save_errors::{AppError, AppResult};
use save_ports::CacheValue;
use tracing::debug;

use super::entity_service::{CacheSync, EntityService};

/// 处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// 值写入缓存，需要安排刷新
    Cached,
    /// 缓存关闭，值已直接写入持久化存储
    Persisted,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> GameSaveEventType;

    async fn apply(&self, event: &GameSaveEvent, cache_enabled: bool) -> AppResult<HandlerOutcome>;
}

async fn store<V: CacheValue>(
    service: &EntityService<V>,
    event: &GameSaveEvent,
    value: &V,
    cache_enabled: bool,
) -> AppResult<HandlerOutcome> {
    if cache_enabled {
        service.write_cache(&event.game_save_id, value).await?;
        Ok(HandlerOutcome::Cached)
    } else {
        let id = &event.game_save_id;
        service.persist(id, value, CacheSync::Skip).await?;
        // 开关关闭前缓存的旧值仍可能在待刷新集合中，不能让它覆盖这次写入
        service.evict(id).await?;
        Ok(HandlerOutcome::Persisted)
    }
}

/// 整值替换的处理器（货币、关卡）
pub struct ReplaceHandler<V: CacheValue> {
    event_type: GameSaveEventType,
    service: Arc<EntityService<V>>,
    decode: fn(&GameSaveEvent) -> AppResult<V>,
}

impl<V: CacheValue> ReplaceHandler<V> {
    pub fn new(
        event_type: GameSaveEventType,
        service: Arc<EntityService<V>>,
        decode: fn(&GameSaveEvent) -> AppResult<V>,
    ) -> Self {
        Self {
            event_type,
            service,
            decode,
        }
    }
}

impl ReplaceHandler<Currency> {
    pub fn currency(service: Arc<EntityService<Currency>>) -> Self {
        Self::new(GameSaveEventType::CurrencyUpdate, service, GameSaveEvent::currency)
    }
}

impl ReplaceHandler<Stage> {
    pub fn stage(service: Arc<EntityService<Stage>>) -> Self {
        Self::new(GameSaveEventType::StageUpdate, service, GameSaveEvent::stage)
    }
}

#[async_trait]
impl<V: CacheValue> EventHandler for ReplaceHandler<V> {
    fn event_type(&self) -> GameSaveEventType {
        self.event_type
    }

    async fn apply(&self, event: &GameSaveEvent, cache_enabled: bool) -> AppResult<HandlerOutcome> {
        let value = (self.decode)(event)?;
        store(&self.service, event, &value, cache_enabled).await
    }
}

/// 属性处理器
///
/// 部分更新合并到上一次的完整值上：缓存开启时优先取缓存，
/// 否则（或未命中）取持久化存储中的值。
pub struct CharacteristicsHandler {
    service: Arc<EntityService<Characteristics>>,
}

impl CharacteristicsHandler {
    pub fn new(service: Arc<EntityService<Characteristics>>) -> Self {
        Self { service }
    }

    async fn merge_base(
        &self,
        event: &GameSaveEvent,
        cache_enabled: bool,
    ) -> AppResult<Characteristics> {
        let id = &event.game_save_id;
        if cache_enabled {
            if let Some(cached) = self.service.cached(id).await? {
                return Ok(cached);
            }
            debug!(game_save_id = %id, "No cached characteristics, merging onto stored value");
        }

        self.service.find_stored(id).await?.ok_or_else(|| {
            AppError::not_found(format!("Characteristics not found for game save {}", id))
        })
    }

    async fn resolve(
        &self,
        event: &GameSaveEvent,
        update: &CharacteristicsUpdate,
        cache_enabled: bool,
    ) -> AppResult<Characteristics> {
        match update.to_complete() {
            Some(complete) => Ok(complete),
            None => Ok(update.merge_onto(&self.merge_base(event, cache_enabled).await?)),
        }
    }
}

#[async_trait]
impl EventHandler for CharacteristicsHandler {
    fn event_type(&self) -> GameSaveEventType {
        GameSaveEventType::CharacteristicsUpdate
    }

    async fn apply(&self, event: &GameSaveEvent, cache_enabled: bool) -> AppResult<HandlerOutcome> {
        let update = event.characteristics_update()?;
        let merged = self.resolve(event, &update, cache_enabled).await?;
        store(&self.service, event, &merged, cache_enabled).await
    }
}

/// 事件类型到处理器的注册表
#[derive(Default, Clone)]
pub struct EventHandlerRegistry {
    handlers: HashMap<GameSaveEventType, Arc<dyn EventHandler>>,
}

impl EventHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(handler.event_type(), handler);
        self
    }

    pub fn get(&self, event_type: GameSaveEventType) -> AppResult<Arc<dyn EventHandler>> {
        self.handlers
            .get(&event_type)
            .cloned()
            .ok_or_else(|| AppError::validation(format!("No handler registered for {}", event_type)))
    }
}
