//! 实体读写服务
//!
//! 读路径：缓存开启时先读缓存，未命中读持久化存储并回填缓存。
//! 写路径：写持久化存储，按 `CacheSync` 决定是否同步缓存。

use std::sync::Arc;

use save_common::GameSaveId;
use save_errors::{AppError, AppResult};
use save_ports::{CacheKind, CachePort, CacheValue, EntityRepositoryPort};
use tracing::{debug, warn};

use super::cache_manager::CacheToggle;

/// 持久化后是否同步缓存
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSync {
    Update,
    /// 刷新路径使用，避免把刚持久化的值再写回缓存
    Skip,
}

pub struct EntityService<V: CacheValue> {
    cache: Arc<dyn CachePort<V>>,
    repository: Arc<dyn EntityRepositoryPort<V>>,
    toggle: CacheToggle,
}

impl<V: CacheValue> EntityService<V> {
    pub fn new(
        cache: Arc<dyn CachePort<V>>,
        repository: Arc<dyn EntityRepositoryPort<V>>,
        toggle: CacheToggle,
    ) -> Self {
        Self {
            cache,
            repository,
            toggle,
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.cache.kind()
    }

    pub fn cache_enabled(&self) -> bool {
        self.toggle.is_enabled()
    }

    /// 读取当前值，存储中不存在时返回 `NotFound`
    pub async fn load(&self, id: &GameSaveId) -> AppResult<V> {
        if self.toggle.is_enabled() {
            match self.cache.get(id).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => debug!(game_save_id = %id, kind = %self.kind(), "Cache miss"),
                Err(e) => {
                    warn!(game_save_id = %id, kind = %self.kind(), error = %e, "Cache read failed, falling back to storage")
                }
            }
        }

        let value = self.find_stored(id).await?.ok_or_else(|| {
            AppError::not_found(format!("{} not found for game save {}", self.kind(), id))
        })?;

        if self.toggle.is_enabled() {
            if let Err(e) = self.cache.set(id, &value).await {
                warn!(game_save_id = %id, kind = %self.kind(), error = %e, "Failed to populate cache");
            }
        }
        Ok(value)
    }

    /// 直接读缓存，不受开关影响
    pub async fn cached(&self, id: &GameSaveId) -> AppResult<Option<V>> {
        self.cache.get(id).await
    }

    pub async fn find_stored(&self, id: &GameSaveId) -> AppResult<Option<V>> {
        self.repository.find(id).await
    }

    /// 写入缓存（写回路径），不触及持久化存储
    pub async fn write_cache(&self, id: &GameSaveId, value: &V) -> AppResult<()> {
        self.cache.set(id, value).await
    }

    /// 删除缓存条目，不受开关影响
    pub async fn evict(&self, id: &GameSaveId) -> AppResult<()> {
        self.cache.unset(id).await
    }

    /// 写入持久化存储
    pub async fn persist(&self, id: &GameSaveId, value: &V, sync: CacheSync) -> AppResult<()> {
        self.repository.update(id, value).await?;

        if sync == CacheSync::Update && self.toggle.is_enabled() {
            self.cache.set(id, value).await?;
        }
        Ok(())
    }
}
