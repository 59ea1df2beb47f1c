//! 刷新调度器
//!
//! 单个后台任务按固定延迟运行周期：扫描到期条目、原子认领、刷新、释放。
//! 刷新失败的存档留在处理中集合；是否自动放回取决于 `processing_timeout_ms`。

use std::sync::Arc;
use std::time::Duration;

use save_common::{Clock, GameSaveId};
use save_config::FlushConfig;
use save_errors::AppResult;
use save_ports::FlushQueuePort;
use save_telemetry::{record_flush, record_flush_cycle, set_processing_stuck};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::flush_service::CacheFlushService;

#[derive(Debug, Clone)]
pub struct FlushSchedulerConfig {
    pub check_interval: Duration,
    /// 处理中条目超过该时长放回待刷新集合；`None` 表示只告警
    pub processing_timeout_ms: Option<u64>,
}

impl Default for FlushSchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            processing_timeout_ms: None,
        }
    }
}

impl From<&FlushConfig> for FlushSchedulerConfig {
    fn from(config: &FlushConfig) -> Self {
        Self {
            check_interval: config.check_interval(),
            processing_timeout_ms: config.processing_timeout_ms,
        }
    }
}

/// 一个周期的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub due: usize,
    pub claimed: usize,
    pub flushed: usize,
    pub failed: usize,
    pub requeued: usize,
}

pub struct FlushScheduler {
    queue: Arc<dyn FlushQueuePort>,
    flush_service: Arc<CacheFlushService>,
    clock: Arc<dyn Clock>,
    config: FlushSchedulerConfig,
}

impl FlushScheduler {
    pub fn new(
        queue: Arc<dyn FlushQueuePort>,
        flush_service: Arc<CacheFlushService>,
        clock: Arc<dyn Clock>,
        config: FlushSchedulerConfig,
    ) -> Self {
        Self {
            queue,
            flush_service,
            clock,
            config,
        }
    }

    /// 启动后台调度任务
    ///
    /// 启动后立即运行第一个周期，之后每个周期结束再等待 `check_interval`。
    /// 取消后不再开始新周期；进行中的周期会完整执行。
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.config.check_interval.as_secs(),
                "Flush scheduler started"
            );

            while !shutdown.is_cancelled() {
                if let Err(e) = self.run_cycle().await {
                    error!(error = %e, "Flush cycle failed");
                    record_flush_cycle("failed");
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.config.check_interval) => {}
                    _ = shutdown.cancelled() => {
                        info!("Flush scheduler received shutdown signal");
                        break;
                    }
                }
            }
            info!("Flush scheduler stopped");
        })
    }

    /// 执行一个调度周期
    pub async fn run_cycle(&self) -> AppResult<CycleSummary> {
        let now = self.clock.now_millis();
        // 处理中集合检查失败不影响本周期的到期刷新
        let requeued = match self.check_processing(now).await {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "Failed to check processing set");
                0
            }
        };
        let mut summary = CycleSummary {
            requeued,
            ..Default::default()
        };

        let due = self.queue.due(now).await?;
        summary.due = due.len();
        if due.is_empty() {
            record_flush_cycle("idle");
            return Ok(summary);
        }

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            match self.queue.claim(&id, now).await {
                Ok(true) => claimed.push(id),
                Ok(false) => debug!(game_save_id = %id, "Claim lost, skipping"),
                Err(e) => error!(game_save_id = %id, error = %e, "Failed to claim game save"),
            }
        }
        summary.claimed = claimed.len();

        self.flush_claimed(&claimed, &mut summary).await;
        record_flush_cycle("completed");

        if summary.claimed > 0 {
            info!(
                due = summary.due,
                claimed = summary.claimed,
                flushed = summary.flushed,
                failed = summary.failed,
                "Flush cycle completed"
            );
        }
        Ok(summary)
    }

    /// 忽略防抖立即刷新全部待刷新条目，随后重试处理中集合里遗留的条目
    pub async fn flush_all(&self) -> AppResult<CycleSummary> {
        let now = self.clock.now_millis();
        let leftovers: Vec<GameSaveId> = self
            .queue
            .processing()
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();
        let pending = self.queue.pending().await?;

        let mut summary = CycleSummary {
            due: pending.len(),
            ..Default::default()
        };

        let mut claimed = Vec::with_capacity(pending.len());
        for entry in pending {
            match self.queue.force_claim(&entry.id, now).await {
                Ok(true) => claimed.push(entry.id),
                Ok(false) => debug!(game_save_id = %entry.id, "Claim lost, skipping"),
                Err(e) => error!(game_save_id = %entry.id, error = %e, "Failed to claim game save"),
            }
        }
        summary.claimed = claimed.len();
        self.flush_claimed(&claimed, &mut summary).await;

        if !leftovers.is_empty() {
            info!(count = leftovers.len(), "Retrying game saves left in processing");
            summary.requeued = leftovers.len();
            self.flush_claimed(&leftovers, &mut summary).await;
        }

        info!(
            pending = summary.due,
            recovered = summary.requeued,
            flushed = summary.flushed,
            failed = summary.failed,
            "Full flush completed"
        );
        Ok(summary)
    }

    async fn flush_claimed(&self, ids: &[GameSaveId], summary: &mut CycleSummary) {
        for id in ids {
            if self.flush_one(id).await {
                summary.flushed += 1;
            } else {
                summary.failed += 1;
            }
        }
    }

    /// 刷新并释放一个已认领的存档，失败时保留在处理中集合
    async fn flush_one(&self, id: &GameSaveId) -> bool {
        match self.flush_service.flush(id).await {
            Ok(report) => {
                if report.is_noop() {
                    debug!(game_save_id = %id, "Nothing cached to flush");
                }
                if let Err(e) = self.queue.release(id).await {
                    error!(game_save_id = %id, error = %e, "Flushed but failed to release claim");
                    record_flush("release_failed");
                    return false;
                }
                record_flush("success");
                true
            }
            Err(e) => {
                error!(game_save_id = %id, error = %e, "Flush failed, game save stays in processing");
                record_flush("failure");
                false
            }
        }
    }

    /// 处理中集合的滞留检查，返回被放回待刷新集合的数量
    async fn check_processing(&self, now: i64) -> AppResult<usize> {
        if let Some(timeout_ms) = self.config.processing_timeout_ms {
            let requeued = self
                .queue
                .requeue_stale(now - timeout_ms as i64, now)
                .await?;
            if !requeued.is_empty() {
                warn!(count = requeued.len(), timeout_ms, "Requeued stale processing entries");
            }
            set_processing_stuck(self.queue.processing().await?.len());
            return Ok(requeued.len());
        }

        let stuck = self.queue.processing().await?.len();
        set_processing_stuck(stuck);
        if stuck > 0 {
            warn!(count = stuck, "Game saves stuck in processing");
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::flush_service::{FlushOutcome, FlushTarget};
    use async_trait::async_trait;
    use save_adapter_memory::InMemoryFlushQueue;
    use save_common::ManualClock;
    use save_errors::AppError;
    use save_ports::{CacheKind, ScheduledEntry};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// 记录刷新调用，指定的存档刷新失败
    #[derive(Default)]
    struct MockTarget {
        flushed: Mutex<Vec<GameSaveId>>,
        failing: Mutex<HashSet<GameSaveId>>,
    }

    #[async_trait]
    impl FlushTarget for MockTarget {
        fn kind(&self) -> CacheKind {
            CacheKind::Currency
        }

        async fn flush(&self, id: &GameSaveId) -> AppResult<FlushOutcome> {
            if self.failing.lock().unwrap().contains(id) {
                return Err(AppError::database("connection reset"));
            }
            self.flushed.lock().unwrap().push(*id);
            Ok(FlushOutcome::Persisted)
        }
    }

    struct Fixture {
        queue: Arc<InMemoryFlushQueue>,
        target: Arc<MockTarget>,
        clock: ManualClock,
        scheduler: FlushScheduler,
    }

    fn fixture(processing_timeout_ms: Option<u64>) -> Fixture {
        let queue = Arc::new(InMemoryFlushQueue::new());
        let target = Arc::new(MockTarget::default());
        let clock = ManualClock::new(10_000);
        let targets: Vec<Arc<dyn FlushTarget>> = vec![target.clone()];
        let scheduler = FlushScheduler::new(
            queue.clone(),
            Arc::new(CacheFlushService::new(targets)),
            Arc::new(clock.clone()),
            FlushSchedulerConfig {
                check_interval: Duration::from_millis(10),
                processing_timeout_ms,
            },
        );
        Fixture {
            queue,
            target,
            clock,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_cycle_flushes_only_due_entries() {
        let f = fixture(None);
        let due = GameSaveId::new();
        let later = GameSaveId::new();
        f.queue.schedule(&due, 9_000).await.unwrap();
        f.queue.schedule(&later, 12_000).await.unwrap();

        let summary = f.scheduler.run_cycle().await.unwrap();

        assert_eq!(summary.due, 1);
        assert_eq!(summary.flushed, 1);
        assert_eq!(*f.target.flushed.lock().unwrap(), vec![due]);
        assert_eq!(f.queue.processing_score(&due), None);
        assert_eq!(f.queue.pending_score(&later), Some(12_000));
    }

    #[tokio::test]
    async fn test_failed_flush_stays_in_processing() {
        let f = fixture(None);
        let ok = GameSaveId::new();
        let broken = GameSaveId::new();
        f.target.failing.lock().unwrap().insert(broken);
        f.queue.schedule(&ok, 10_000).await.unwrap();
        f.queue.schedule(&broken, 10_000).await.unwrap();

        let summary = f.scheduler.run_cycle().await.unwrap();

        assert_eq!(summary.flushed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(f.queue.processing_score(&broken), Some(10_000));
        assert_eq!(f.queue.pending_score(&broken), None);
        assert_eq!(f.queue.processing_score(&ok), None);

        // 没有超时配置时不会自动重试
        f.clock.advance(60_000);
        let summary = f.scheduler.run_cycle().await.unwrap();
        assert_eq!(summary.due, 0);
        assert_eq!(f.queue.processing_score(&broken), Some(10_000));
    }

    #[tokio::test]
    async fn test_stale_processing_requeued_after_timeout() {
        let f = fixture(Some(30_000));
        let broken = GameSaveId::new();
        f.target.failing.lock().unwrap().insert(broken);
        f.queue.schedule(&broken, 10_000).await.unwrap();
        f.scheduler.run_cycle().await.unwrap();

        f.target.failing.lock().unwrap().clear();
        f.clock.advance(10_000);
        let summary = f.scheduler.run_cycle().await.unwrap();
        assert_eq!(summary.requeued, 0);

        f.clock.advance(20_000);
        let summary = f.scheduler.run_cycle().await.unwrap();
        assert_eq!(summary.requeued, 1);
        assert_eq!(summary.flushed, 1);
        assert_eq!(f.queue.processing_score(&broken), None);
        assert_eq!(f.queue.pending_score(&broken), None);
    }

    #[tokio::test]
    async fn test_flush_all_ignores_debounce_and_retries_processing() {
        let f = fixture(None);
        let future = GameSaveId::new();
        let stuck = GameSaveId::new();
        f.queue.schedule(&stuck, 10_000).await.unwrap();
        f.queue.claim(&stuck, 10_000).await.unwrap();
        f.queue.schedule(&future, 99_000).await.unwrap();

        let summary = f.scheduler.flush_all().await.unwrap();

        assert_eq!(summary.flushed, 2);
        assert!(f.queue.pending().await.unwrap().is_empty());
        assert!(f.queue.processing().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_error_when_queue_unavailable() {
        let f = fixture(None);
        f.queue.set_unavailable(true);
        assert!(f.scheduler.run_cycle().await.is_err());
    }

    #[tokio::test]
    async fn test_start_stops_on_cancel() {
        let f = fixture(None);
        let id = GameSaveId::new();
        f.queue.schedule(&id, 10_000).await.unwrap();

        let target = f.target.clone();
        let token = CancellationToken::new();
        let handle = Arc::new(f.scheduler).start(token.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(*target.flushed.lock().unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_start_runs_first_cycle_without_waiting_interval() {
        let queue = Arc::new(InMemoryFlushQueue::new());
        let target = Arc::new(MockTarget::default());
        let targets: Vec<Arc<dyn FlushTarget>> = vec![target.clone()];
        let scheduler = FlushScheduler::new(
            queue.clone(),
            Arc::new(CacheFlushService::new(targets)),
            Arc::new(ManualClock::new(10_000)),
            FlushSchedulerConfig {
                check_interval: Duration::from_secs(60),
                processing_timeout_ms: None,
            },
        );
        let id = GameSaveId::new();
        queue.schedule(&id, 10_000).await.unwrap();

        let token = CancellationToken::new();
        let handle = Arc::new(scheduler).start(token.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*target.flushed.lock().unwrap(), vec![id]);
        assert_eq!(queue.processing_score(&id), None);

        token.cancel();
        handle.await.unwrap();
    }

    /// 处理中集合的读取与回收总是失败，其余操作委托给内存队列
    struct BrokenProcessingQueue {
        inner: InMemoryFlushQueue,
    }

    #[async_trait]
    impl FlushQueuePort for BrokenProcessingQueue {
        async fn schedule(&self, id: &GameSaveId, ready_at: i64) -> AppResult<()> {
            self.inner.schedule(id, ready_at).await
        }

        async fn due(&self, now: i64) -> AppResult<Vec<GameSaveId>> {
            self.inner.due(now).await
        }

        async fn claim(&self, id: &GameSaveId, now: i64) -> AppResult<bool> {
            self.inner.claim(id, now).await
        }

        async fn force_claim(&self, id: &GameSaveId, now: i64) -> AppResult<bool> {
            self.inner.force_claim(id, now).await
        }

        async fn release(&self, id: &GameSaveId) -> AppResult<()> {
            self.inner.release(id).await
        }

        async fn pending(&self) -> AppResult<Vec<ScheduledEntry>> {
            self.inner.pending().await
        }

        async fn processing(&self) -> AppResult<Vec<ScheduledEntry>> {
            Err(AppError::cache("ZRANGE timed out"))
        }

        async fn requeue_stale(&self, _claimed_before: i64, _now: i64) -> AppResult<Vec<GameSaveId>> {
            Err(AppError::cache("EVALSHA timed out"))
        }
    }

    #[tokio::test]
    async fn test_processing_check_failure_does_not_block_due_flushes() {
        for timeout in [None, Some(30_000)] {
            let queue = Arc::new(BrokenProcessingQueue {
                inner: InMemoryFlushQueue::new(),
            });
            let target = Arc::new(MockTarget::default());
            let targets: Vec<Arc<dyn FlushTarget>> = vec![target.clone()];
            let scheduler = FlushScheduler::new(
                queue.clone(),
                Arc::new(CacheFlushService::new(targets)),
                Arc::new(ManualClock::new(10_000)),
                FlushSchedulerConfig {
                    check_interval: Duration::from_millis(10),
                    processing_timeout_ms: timeout,
                },
            );
            let id = GameSaveId::new();
            queue.schedule(&id, 9_000).await.unwrap();

            let summary = scheduler.run_cycle().await.unwrap();

            assert_eq!(summary.requeued, 0);
            assert_eq!(summary.flushed, 1);
            assert_eq!(*target.flushed.lock().unwrap(), vec![id]);
            assert_eq!(queue.inner.processing_score(&id), None);
        }
    }
}
