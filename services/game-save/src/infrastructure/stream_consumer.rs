//! 事件流消费循环
//!
//! 从消费组读取更新事件并交给 `UpdateEventConsumer`。
//! 成功或不可重试的失败确认消息；可重试的失败保持未确认，
//! 空闲超过 `reclaim_idle_ms` 后重新认领。

use std::sync::Arc;
use std::time::Duration;

use save_config::StreamConfig;
use save_domain::GameSaveEvent;
use save_errors::AppResult;
use save_ports::{EventSourcePort, StreamDelivery};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::UpdateEventConsumer;

const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct StreamConsumerConfig {
    pub batch_size: usize,
    pub block_ms: usize,
    pub reclaim_idle_ms: u64,
}

impl From<&StreamConfig> for StreamConsumerConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            block_ms: config.block_ms,
            reclaim_idle_ms: config.reclaim_idle_ms,
        }
    }
}

/// 一批消息的处理结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub applied: usize,
    pub rejected: usize,
    pub retained: usize,
}

pub struct GameStreamConsumer {
    source: Arc<dyn EventSourcePort>,
    consumer: Arc<UpdateEventConsumer>,
    config: StreamConsumerConfig,
}

impl GameStreamConsumer {
    pub fn new(
        source: Arc<dyn EventSourcePort>,
        consumer: Arc<UpdateEventConsumer>,
        config: StreamConsumerConfig,
    ) -> Self {
        Self {
            source,
            consumer,
            config,
        }
    }

    /// 启动后台消费任务
    ///
    /// 读取只与关闭信号竞争：已投递的消息一旦被丢弃，要等到空闲超时后才会重新处理，
    /// 会晚于同一存档的后续事件。回收在两批之间按间隔执行。
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.source.ensure_group().await {
                error!(error = %e, "Failed to create consumer group, stream consumer not started");
                return;
            }
            info!(batch_size = self.config.batch_size, "Stream consumer started");

            let reclaim_every = Duration::from_millis(self.config.reclaim_idle_ms.max(1));
            let mut last_reclaim: Option<Instant> = None;

            loop {
                if last_reclaim.is_none_or(|at| at.elapsed() >= reclaim_every) {
                    if let Err(e) = self.reclaim_once().await {
                        error!(error = %e, "Failed to reclaim idle stream entries");
                    }
                    last_reclaim = Some(Instant::now());
                }

                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Stream consumer received shutdown signal");
                        break;
                    }
                    result = self.source.read(self.config.batch_size, self.config.block_ms) => {
                        match result {
                            Ok(deliveries) => {
                                if let Err(e) = self.process_batch(deliveries).await {
                                    error!(error = %e, "Failed to acknowledge stream entries");
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "Failed to read from stream");
                                tokio::time::sleep(READ_ERROR_BACKOFF).await;
                            }
                        }
                    }
                }
            }
            info!("Stream consumer stopped");
        })
    }

    /// 重新投递空闲过久的未确认消息
    pub async fn reclaim_once(&self) -> AppResult<BatchStats> {
        let deliveries = self
            .source
            .reclaim(self.config.reclaim_idle_ms, self.config.batch_size)
            .await?;
        if deliveries.is_empty() {
            return Ok(BatchStats::default());
        }
        info!(count = deliveries.len(), "Retrying reclaimed stream entries");
        self.process_batch(deliveries).await
    }

    /// 处理一批消息并确认可以确认的部分
    pub async fn process_batch(&self, deliveries: Vec<StreamDelivery>) -> AppResult<BatchStats> {
        let mut stats = BatchStats::default();
        let mut to_ack = Vec::with_capacity(deliveries.len());

        for delivery in deliveries {
            let event = match GameSaveEvent::from_stream_fields(&delivery.fields) {
                Ok(event) => event,
                Err(e) => {
                    warn!(entry_id = %delivery.entry_id, error = %e, "Dropping undecodable stream entry");
                    stats.rejected += 1;
                    to_ack.push(delivery.entry_id);
                    continue;
                }
            };

            match self.consumer.on_event(&event).await {
                Ok(()) => {
                    stats.applied += 1;
                    to_ack.push(delivery.entry_id);
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        entry_id = %delivery.entry_id,
                        game_save_id = %event.game_save_id,
                        error = %e,
                        "Event not applied, leaving entry pending for redelivery"
                    );
                    stats.retained += 1;
                }
                Err(e) => {
                    warn!(
                        entry_id = %delivery.entry_id,
                        game_save_id = %event.game_save_id,
                        event_type = %event.event_type,
                        error = %e,
                        "Rejecting event"
                    );
                    stats.rejected += 1;
                    to_ack.push(delivery.entry_id);
                }
            }
        }

        if !to_ack.is_empty() {
            self.source.ack(&to_ack).await?;
            debug!(count = to_ack.len(), "Acknowledged stream entries");
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{
        CacheToggle, EventHandler, EventHandlerRegistry, HandlerOutcome,
    };
    use async_trait::async_trait;
    use save_adapter_memory::{InMemoryEventSource, InMemoryFlushQueue};
    use save_common::{GameSaveId, ManualClock, UserId};
    use save_domain::GameSaveEventType;
    use save_errors::AppError;
    use save_ports::FlushQueuePort;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 按 payload 中的 `mode` 字段决定结果
    #[derive(Default)]
    struct ScriptedHandler {
        applied: Mutex<usize>,
    }

    #[async_trait]
    impl EventHandler for ScriptedHandler {
        fn event_type(&self) -> GameSaveEventType {
            GameSaveEventType::CurrencyUpdate
        }

        async fn apply(&self, event: &GameSaveEvent, _cache_enabled: bool) -> AppResult<HandlerOutcome> {
            match event.payload.get("mode").map(String::as_str) {
                Some("transient") => Err(AppError::cache("connection refused")),
                Some("invalid") => Err(AppError::validation("gold must be non-negative")),
                _ => {
                    *self.applied.lock().unwrap() += 1;
                    Ok(HandlerOutcome::Cached)
                }
            }
        }
    }

    struct Fixture {
        source: Arc<InMemoryEventSource>,
        queue: Arc<InMemoryFlushQueue>,
        handler: Arc<ScriptedHandler>,
        stream: GameStreamConsumer,
    }

    fn fixture() -> Fixture {
        let source = Arc::new(InMemoryEventSource::new());
        let queue = Arc::new(InMemoryFlushQueue::new());
        let handler = Arc::new(ScriptedHandler::default());
        let consumer = Arc::new(UpdateEventConsumer::new(
            EventHandlerRegistry::new().register(handler.clone()),
            queue.clone(),
            CacheToggle::new(true),
            Arc::new(ManualClock::new(1_000)),
            5_000,
        ));
        let stream = GameStreamConsumer::new(
            source.clone(),
            consumer,
            StreamConsumerConfig {
                batch_size: 10,
                block_ms: 0,
                reclaim_idle_ms: 0,
            },
        );
        Fixture {
            source,
            queue,
            handler,
            stream,
        }
    }

    fn event_fields(id: GameSaveId, mode: &str) -> HashMap<String, String> {
        let payload = HashMap::from([("mode".to_string(), mode.to_string())]);
        GameSaveEvent::new(
            GameSaveEventType::CurrencyUpdate,
            id,
            UserId::new("player@example.com"),
            payload,
        )
        .to_stream_fields()
        .unwrap()
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_applied_entries_are_acked_and_scheduled() {
        let f = fixture();
        let id = GameSaveId::new();
        let entry = f.source.push(event_fields(id, "ok"));

        let batch = f.source.read(10, 0).await.unwrap();
        let stats = f.stream.process_batch(batch).await.unwrap();

        assert_eq!(stats.applied, 1);
        assert_eq!(f.source.acked(), vec![entry]);
        assert_eq!(f.queue.pending_score(&id), Some(6_000));
    }

    #[tokio::test]
    async fn test_transient_failure_stays_pending_until_reclaimed() {
        let f = fixture();
        let id = GameSaveId::new();
        f.source.push(event_fields(id, "transient"));

        let batch = f.source.read(10, 0).await.unwrap();
        let stats = f.stream.process_batch(batch).await.unwrap();

        assert_eq!(stats.retained, 1);
        assert!(f.source.acked().is_empty());
        assert_eq!(f.source.pending_count(), 1);
        assert!(f.queue.pending().await.unwrap().is_empty());

        let stats = f.stream.reclaim_once().await.unwrap();
        assert_eq!(stats.retained, 1);
        assert_eq!(f.source.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_poison_entries_are_acked() {
        let f = fixture();
        let invalid = f.source.push(event_fields(GameSaveId::new(), "invalid"));
        let garbage = f
            .source
            .push(HashMap::from([("eventType".to_string(), "UNKNOWN".to_string())]));

        let batch = f.source.read(10, 0).await.unwrap();
        let stats = f.stream.process_batch(batch).await.unwrap();

        assert_eq!(stats.rejected, 2);
        assert_eq!(f.source.acked(), vec![invalid, garbage]);
        assert_eq!(*f.handler.applied.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_start_consumes_until_cancelled() {
        let f = fixture();
        let id = GameSaveId::new();
        f.source.push(event_fields(id, "ok"));

        let token = CancellationToken::new();
        let handle = Arc::new(f.stream).start(token.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(f.source.acked().len(), 1);
        assert_eq!(f.queue.pending_score(&id), Some(6_000));
    }

    /// 每次读取阻塞满 `block_ms`，记录被中途丢弃的读取
    #[derive(Default)]
    struct BlockingSource {
        reads_started: AtomicUsize,
        reads_dropped: Arc<AtomicUsize>,
        reclaims: AtomicUsize,
    }

    struct DropCounter {
        dropped: Arc<AtomicUsize>,
        finished: bool,
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            if !self.finished {
                self.dropped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl EventSourcePort for BlockingSource {
        async fn ensure_group(&self) -> AppResult<()> {
            Ok(())
        }

        async fn read(&self, _count: usize, block_ms: usize) -> AppResult<Vec<StreamDelivery>> {
            self.reads_started.fetch_add(1, Ordering::SeqCst);
            let mut guard = DropCounter {
                dropped: self.reads_dropped.clone(),
                finished: false,
            };
            tokio::time::sleep(Duration::from_millis(block_ms as u64)).await;
            guard.finished = true;
            Ok(Vec::new())
        }

        async fn ack(&self, _entry_ids: &[String]) -> AppResult<()> {
            Ok(())
        }

        async fn reclaim(&self, _min_idle_ms: u64, _count: usize) -> AppResult<Vec<StreamDelivery>> {
            self.reclaims.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_reclaim_interval_does_not_cancel_inflight_read() {
        let source = Arc::new(BlockingSource::default());
        let consumer = Arc::new(UpdateEventConsumer::new(
            EventHandlerRegistry::new(),
            Arc::new(InMemoryFlushQueue::new()),
            CacheToggle::new(true),
            Arc::new(ManualClock::new(1_000)),
            5_000,
        ));
        let stream = GameStreamConsumer::new(
            source.clone(),
            consumer,
            StreamConsumerConfig {
                batch_size: 10,
                block_ms: 20,
                reclaim_idle_ms: 5,
            },
        );

        let token = CancellationToken::new();
        let handle = Arc::new(stream).start(token.clone());
        tokio::time::sleep(Duration::from_millis(110)).await;

        // 回收间隔远短于阻塞时长，读取仍应全部完成
        assert_eq!(source.reads_dropped.load(Ordering::SeqCst), 0);
        assert!(source.reads_started.load(Ordering::SeqCst) >= 2);
        assert!(source.reclaims.load(Ordering::SeqCst) >= 2);

        token.cancel();
        handle.await.unwrap();
    }
}
