//! 实体缓存集合
//!
//! 每种实体一个类型化的缓存端口；管理操作通过按类型索引的擦除视图进行。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use save_common::GameSaveId;
use save_domain::{Characteristics, Currency, GameMetadata, GameSession, Stage};
use save_errors::AppResult;
use save_ports::{CacheKind, CachePort, CacheValue};

/// 与值类型无关的缓存管理操作
#[async_trait]
pub trait CacheInvalidation: Send + Sync {
    fn kind(&self) -> CacheKind;

    /// 当前条目数，需要遍历整个哈希，只用于管理与启动路径
    async fn entry_count(&self) -> AppResult<usize>;

    async fn unset(&self, id: &GameSaveId) -> AppResult<()>;

    async fn clear(&self) -> AppResult<()>;
}

struct Invalidator<V: CacheValue>(Arc<dyn CachePort<V>>);

#[async_trait]
impl<V: CacheValue> CacheInvalidation for Invalidator<V> {
    fn kind(&self) -> CacheKind {
        self.0.kind()
    }

    async fn entry_count(&self) -> AppResult<usize> {
        Ok(self.0.get_all().await?.len())
    }

    async fn unset(&self, id: &GameSaveId) -> AppResult<()> {
        self.0.unset(id).await
    }

    async fn clear(&self) -> AppResult<()> {
        self.0.clear().await
    }
}

fn erase<V: CacheValue>(cache: &Arc<dyn CachePort<V>>) -> Arc<dyn CacheInvalidation> {
    Arc::new(Invalidator(cache.clone()))
}

#[derive(Clone)]
pub struct EntityCaches {
    pub characteristics: Arc<dyn CachePort<Characteristics>>,
    pub currency: Arc<dyn CachePort<Currency>>,
    pub stage: Arc<dyn CachePort<Stage>>,
    pub metadata: Arc<dyn CachePort<GameMetadata>>,
    pub session: Arc<dyn CachePort<GameSession>>,
}

impl EntityCaches {
    /// 按类型索引的失效视图
    pub fn registry(&self) -> BTreeMap<CacheKind, Arc<dyn CacheInvalidation>> {
        [
            erase(&self.characteristics),
            erase(&self.currency),
            erase(&self.stage),
            erase(&self.metadata),
            erase(&self.session),
        ]
        .into_iter()
        .map(|c| (c.kind(), c))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use save_adapter_memory::InMemoryCache;
    use save_common::ManualClock;
    use std::time::Duration;

    #[tokio::test]
    async fn test_erased_view_counts_live_entries() {
        let clock = ManualClock::new(0);
        let cache: Arc<dyn CachePort<Currency>> = Arc::new(InMemoryCache::<Currency>::new(
            CacheKind::Currency,
            Duration::from_secs(60),
            Arc::new(clock.clone()),
        ));
        let view = erase(&cache);
        let kept = GameSaveId::new();
        let expiring = GameSaveId::new();
        cache.set(&kept, &Currency::default()).await.unwrap();
        cache
            .set_with_ttl(&expiring, &Currency::default(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(view.kind(), CacheKind::Currency);
        assert_eq!(view.entry_count().await.unwrap(), 2);

        clock.advance(2_000);
        assert_eq!(view.entry_count().await.unwrap(), 1);

        view.unset(&kept).await.unwrap();
        assert_eq!(view.entry_count().await.unwrap(), 0);
    }
}
