//! 缓存管理
//!
//! 进程级的缓存开关，以及全量/单存档的缓存清理。清理不与待刷新集合协调：
//! 被清理的存档之后刷新时找不到缓存值，按“无内容可刷新”处理。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use save_common::GameSaveId;
use save_errors::AppResult;
use save_ports::CacheKind;
use tracing::{error, info};

use super::caches::CacheInvalidation;

/// 共享的缓存开关，注入到读写路径
#[derive(Debug, Clone)]
pub struct CacheToggle(Arc<AtomicBool>);

impl CacheToggle {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }

    /// 原子翻转，返回翻转后的状态
    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true, Ordering::AcqRel)
    }
}

pub struct CacheManager {
    toggle: CacheToggle,
    caches: BTreeMap<CacheKind, Arc<dyn CacheInvalidation>>,
}

impl CacheManager {
    pub fn new(toggle: CacheToggle, caches: BTreeMap<CacheKind, Arc<dyn CacheInvalidation>>) -> Self {
        Self { toggle, caches }
    }

    pub fn toggle_handle(&self) -> CacheToggle {
        self.toggle.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.toggle.is_enabled()
    }

    pub fn toggle_cache_enabling(&self) -> bool {
        let enabled = self.toggle.toggle();
        info!(enabled, "Cache enabling toggled");
        enabled
    }

    /// 每种实体类型当前的缓存条目数
    pub async fn entry_counts(&self) -> AppResult<BTreeMap<CacheKind, usize>> {
        let mut counts = BTreeMap::new();
        for (kind, cache) in &self.caches {
            counts.insert(*kind, cache.entry_count().await?);
        }
        Ok(counts)
    }

    /// 清空所有实体类型的缓存
    ///
    /// 每种类型都会尝试，最后返回遇到的第一个错误。
    pub async fn clear_caches(&self) -> AppResult<()> {
        let mut first_error = None;
        for (kind, cache) in &self.caches {
            if let Err(e) = cache.clear().await {
                error!(kind = %kind, error = %e, "Failed to clear cache");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("All caches cleared");
                Ok(())
            }
        }
    }

    /// 清除单个存档在所有实体类型中的缓存
    pub async fn clear_game_save_values(&self, id: &GameSaveId) -> AppResult<()> {
        let mut first_error = None;
        for (kind, cache) in &self.caches {
            if let Err(e) = cache.unset(id).await {
                error!(game_save_id = %id, kind = %kind, error = %e, "Failed to unset cache entry");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(game_save_id = %id, "Game save cache entries cleared");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use save_errors::AppError;
    use std::sync::Mutex;

    struct MockInvalidation {
        kind: CacheKind,
        fail: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl CacheInvalidation for MockInvalidation {
        fn kind(&self) -> CacheKind {
            self.kind
        }

        async fn entry_count(&self) -> AppResult<usize> {
            if self.fail {
                return Err(AppError::cache("down"));
            }
            Ok(self.kind as usize + 1)
        }

        async fn unset(&self, id: &GameSaveId) -> AppResult<()> {
            self.calls.lock().unwrap().push(format!("unset {} {}", self.kind, id));
            if self.fail {
                return Err(AppError::cache("down"));
            }
            Ok(())
        }

        async fn clear(&self) -> AppResult<()> {
            self.calls.lock().unwrap().push(format!("clear {}", self.kind));
            if self.fail {
                return Err(AppError::cache("down"));
            }
            Ok(())
        }
    }

    fn manager(failing: Option<CacheKind>) -> (CacheManager, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let caches = CacheKind::ALL
            .into_iter()
            .map(|kind| {
                let cache: Arc<dyn CacheInvalidation> = Arc::new(MockInvalidation {
                    kind,
                    fail: failing == Some(kind),
                    calls: calls.clone(),
                });
                (kind, cache)
            })
            .collect();
        (CacheManager::new(CacheToggle::new(true), caches), calls)
    }

    #[test]
    fn test_toggle() {
        let toggle = CacheToggle::new(true);
        let shared = toggle.clone();

        assert!(!toggle.toggle());
        assert!(!shared.is_enabled());
        assert!(shared.toggle());
        assert!(toggle.is_enabled());
    }

    #[tokio::test]
    async fn test_clear_caches_touches_every_kind() {
        let (manager, calls) = manager(None);
        manager.clear_caches().await.unwrap();
        assert_eq!(calls.lock().unwrap().len(), CacheKind::ALL.len());
    }

    #[tokio::test]
    async fn test_clear_game_save_values_continues_after_failure() {
        let (manager, calls) = manager(Some(CacheKind::Currency));
        let id = GameSaveId::new();

        let result = manager.clear_game_save_values(&id).await;
        assert!(matches!(result, Err(AppError::Cache(_))));
        assert_eq!(calls.lock().unwrap().len(), CacheKind::ALL.len());
    }

    #[test]
    fn test_toggle_cache_enabling() {
        let (manager, _) = manager(None);
        let handle = manager.toggle_handle();

        assert!(!manager.toggle_cache_enabling());
        assert!(!handle.is_enabled());
        assert!(manager.toggle_cache_enabling());
        assert!(manager.is_enabled());
    }

    #[tokio::test]
    async fn test_entry_counts_per_kind() {
        let (healthy, _) = manager(None);
        let counts = healthy.entry_counts().await.unwrap();

        assert_eq!(counts.len(), CacheKind::ALL.len());
        for kind in CacheKind::ALL {
            assert_eq!(counts[&kind], kind as usize + 1);
        }

        let (broken, _) = manager(Some(CacheKind::Stage));
        assert!(broken.entry_counts().await.is_err());
    }
}
