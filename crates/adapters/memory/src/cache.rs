//! 内存实体缓存

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use save_common::{Clock, GameSaveId};
use save_errors::AppResult;
use save_ports::{CacheKind, CachePort, CacheValue};

struct Entry<V> {
    value: V,
    expires_at: Option<i64>,
}

pub struct InMemoryCache<V> {
    kind: CacheKind,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<GameSaveId, Entry<V>>>,
}

impl<V: CacheValue> InMemoryCache<V> {
    pub fn new(kind: CacheKind, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            default_ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn is_live(&self, entry: &Entry<V>, now: i64) -> bool {
        entry.expires_at.is_none_or(|at| at > now)
    }

    /// 未过期条目数
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries
            .read()
            .values()
            .filter(|e| self.is_live(e, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<V: CacheValue> CachePort<V> for InMemoryCache<V> {
    fn kind(&self) -> CacheKind {
        self.kind
    }

    async fn get(&self, id: &GameSaveId) -> AppResult<Option<V>> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write();
        match entries.get(id) {
            Some(entry) if self.is_live(entry, now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, id: &GameSaveId, value: &V) -> AppResult<()> {
        self.set_with_ttl(id, value, self.default_ttl).await
    }

    async fn set_with_ttl(&self, id: &GameSaveId, value: &V, ttl: Duration) -> AppResult<()> {
        let expires_at = (!ttl.is_zero()).then(|| self.clock.now_millis() + ttl.as_millis() as i64);
        self.entries.write().insert(
            *id,
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn unset(&self, id: &GameSaveId) -> AppResult<()> {
        self.entries.write().remove(id);
        Ok(())
    }

    async fn get_all(&self) -> AppResult<HashMap<GameSaveId, V>> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| self.is_live(e, now))
            .map(|(id, e)| (*id, e.value.clone()))
            .collect())
    }

    async fn clear(&self) -> AppResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use save_common::ManualClock;
    use save_domain::Currency;

    fn cache(clock: &ManualClock) -> InMemoryCache<Currency> {
        InMemoryCache::new(
            CacheKind::Currency,
            Duration::from_secs(10),
            Arc::new(clock.clone()),
        )
    }

    #[tokio::test]
    async fn test_entry_expires_with_clock() {
        let clock = ManualClock::new(0);
        let cache = cache(&clock);
        let id = GameSaveId::new();

        cache.set(&id, &Currency::default()).await.unwrap();
        clock.advance(9_999);
        assert!(cache.get(&id).await.unwrap().is_some());

        clock.advance(1);
        assert!(cache.get(&id).await.unwrap().is_none());
        assert!(cache.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let clock = ManualClock::new(0);
        let cache = cache(&clock);
        let id = GameSaveId::new();

        cache
            .set_with_ttl(&id, &Currency::default(), Duration::ZERO)
            .await
            .unwrap();
        clock.advance(i64::MAX / 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_resets_expiry() {
        let clock = ManualClock::new(0);
        let cache = cache(&clock);
        let id = GameSaveId::new();

        cache.set(&id, &Currency::new(1, 0, 0, 0).unwrap()).await.unwrap();
        clock.advance(8_000);
        cache.set(&id, &Currency::new(2, 0, 0, 0).unwrap()).await.unwrap();
        clock.advance(8_000);

        assert_eq!(cache.get(&id).await.unwrap().unwrap().gold, 2);
    }
}
