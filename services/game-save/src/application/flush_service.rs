//! 缓存刷新服务
//!
//! 把一个已认领存档的缓存值写入持久化存储。幂等：同一快照刷新两次
//! 与刷新一次的存储状态相同。

use std::sync::Arc;

use async_trait::async_trait;
use save_common::GameSaveId;
use save_errors::AppResult;
use save_ports::{CacheKind, CacheValue};
use tracing::{debug, error, warn};

use super::entity_service::{CacheSync, EntityService};

/// 单个实体类型的刷新结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Persisted,
    /// 缓存中没有值（已过期或被清理）
    Absent,
    /// 持久化存储中没有对应行（存档已删除）
    Missing,
}

/// 可被刷新的实体类型
#[async_trait]
pub trait FlushTarget: Send + Sync {
    fn kind(&self) -> CacheKind;

    async fn flush(&self, id: &GameSaveId) -> AppResult<FlushOutcome>;
}

#[async_trait]
impl<V: CacheValue> FlushTarget for EntityService<V> {
    fn kind(&self) -> CacheKind {
        EntityService::kind(self)
    }

    async fn flush(&self, id: &GameSaveId) -> AppResult<FlushOutcome> {
        let Some(value) = self.cached(id).await? else {
            return Ok(FlushOutcome::Absent);
        };

        match self.persist(id, &value, CacheSync::Skip).await {
            Ok(()) => Ok(FlushOutcome::Persisted),
            Err(e) if e.is_not_found() => Ok(FlushOutcome::Missing),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub outcomes: Vec<(CacheKind, FlushOutcome)>,
}

impl FlushReport {
    pub fn outcome(&self, kind: CacheKind) -> Option<FlushOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| *outcome)
    }

    pub fn persisted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == FlushOutcome::Persisted)
            .count()
    }

    /// 所有类型都没有可刷新的值
    pub fn is_noop(&self) -> bool {
        self.persisted() == 0
    }
}

pub struct CacheFlushService {
    targets: Vec<Arc<dyn FlushTarget>>,
}

impl CacheFlushService {
    pub fn new(targets: Vec<Arc<dyn FlushTarget>>) -> Self {
        Self { targets }
    }

    /// 刷新一个存档的所有实体类型
    ///
    /// 每种类型独立尝试；存储层错误（行不存在除外）在全部尝试完后返回第一个。
    pub async fn flush(&self, id: &GameSaveId) -> AppResult<FlushReport> {
        let mut report = FlushReport::default();
        let mut first_error = None;

        for target in &self.targets {
            let kind = target.kind();
            match target.flush(id).await {
                Ok(FlushOutcome::Missing) => {
                    warn!(game_save_id = %id, kind = %kind, "Game save not found in storage, skipping flush");
                    report.outcomes.push((kind, FlushOutcome::Missing));
                }
                Ok(outcome) => {
                    debug!(game_save_id = %id, kind = %kind, ?outcome, "Flushed");
                    report.outcomes.push((kind, outcome));
                }
                Err(e) => {
                    error!(game_save_id = %id, kind = %kind, error = %e, "Failed to flush cached value");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use save_errors::AppError;
    use std::sync::Mutex;

    struct MockTarget {
        kind: CacheKind,
        result: Result<FlushOutcome, AppError>,
        calls: Mutex<usize>,
    }

    impl MockTarget {
        fn new(kind: CacheKind, result: Result<FlushOutcome, AppError>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                result,
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl FlushTarget for MockTarget {
        fn kind(&self) -> CacheKind {
            self.kind
        }

        async fn flush(&self, _id: &GameSaveId) -> AppResult<FlushOutcome> {
            *self.calls.lock().unwrap() += 1;
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn test_report_per_kind() {
        let targets: Vec<Arc<dyn FlushTarget>> = vec![
            MockTarget::new(CacheKind::Characteristics, Ok(FlushOutcome::Absent)),
            MockTarget::new(CacheKind::Currency, Ok(FlushOutcome::Persisted)),
            MockTarget::new(CacheKind::Stage, Ok(FlushOutcome::Missing)),
        ];
        let service = CacheFlushService::new(targets);

        let report = service.flush(&GameSaveId::new()).await.unwrap();
        assert_eq!(report.outcome(CacheKind::Currency), Some(FlushOutcome::Persisted));
        assert_eq!(report.outcome(CacheKind::Stage), Some(FlushOutcome::Missing));
        assert_eq!(report.persisted(), 1);
        assert!(!report.is_noop());
    }

    #[tokio::test]
    async fn test_error_after_all_kinds_attempted() {
        let failing = MockTarget::new(CacheKind::Characteristics, Err(AppError::database("down")));
        let after = MockTarget::new(CacheKind::Currency, Ok(FlushOutcome::Persisted));
        let targets: Vec<Arc<dyn FlushTarget>> = vec![failing, after.clone()];
        let service = CacheFlushService::new(targets);

        let err = service.flush(&GameSaveId::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(*after.calls.lock().unwrap(), 1);
    }
}
