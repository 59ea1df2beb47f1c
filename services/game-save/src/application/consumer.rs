//! 更新事件消费者
//!
//! 写缓存与延长防抖分数对同一存档按到达顺序串行执行：
//! 最后写入缓存的事件一定也是最后写入 `readyAt` 的事件。

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use save_common::{Clock, GameSaveId};
use save_domain::GameSaveEvent;
use save_errors::AppResult;
use save_ports::FlushQueuePort;
use save_telemetry::record_event;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::cache_manager::CacheToggle;
use super::handlers::{EventHandlerRegistry, HandlerOutcome};

const LOCK_STRIPES: usize = 64;

/// 按存档 ID 分段的互斥锁
struct KeyedLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyedLocks {
    fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock(&self, id: &GameSaveId) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index].lock().await
    }
}

pub struct UpdateEventConsumer {
    registry: EventHandlerRegistry,
    queue: Arc<dyn FlushQueuePort>,
    toggle: CacheToggle,
    clock: Arc<dyn Clock>,
    debounce_window_ms: i64,
    locks: KeyedLocks,
}

impl UpdateEventConsumer {
    pub fn new(
        registry: EventHandlerRegistry,
        queue: Arc<dyn FlushQueuePort>,
        toggle: CacheToggle,
        clock: Arc<dyn Clock>,
        debounce_window_ms: u64,
    ) -> Self {
        Self {
            registry,
            queue,
            toggle,
            clock,
            debounce_window_ms: debounce_window_ms as i64,
            locks: KeyedLocks::new(LOCK_STRIPES),
        }
    }

    /// 处理一个更新事件
    ///
    /// 返回错误时事件未被消费，由传输层重新投递。
    pub async fn on_event(&self, event: &GameSaveEvent) -> AppResult<()> {
        let event_type = event.event_type.as_str();
        let result = self.apply(event).await;
        match &result {
            Ok(()) => record_event(event_type, "applied"),
            Err(e) if e.is_transient() => record_event(event_type, "failed"),
            Err(_) => record_event(event_type, "rejected"),
        }
        result
    }

    async fn apply(&self, event: &GameSaveEvent) -> AppResult<()> {
        let handler = self.registry.get(event.event_type)?;
        let id = &event.game_save_id;

        let _guard = self.locks.lock(id).await;
        let outcome = handler.apply(event, self.toggle.is_enabled()).await?;

        match outcome {
            HandlerOutcome::Cached => {
                let ready_at = self.clock.now_millis() + self.debounce_window_ms;
                if let Err(e) = self.queue.schedule(id, ready_at).await {
                    // 缓存已更新但未安排刷新，必须让事件重投
                    warn!(game_save_id = %id, error = %e, "Cache updated but flush scheduling failed");
                    return Err(e);
                }
                debug!(
                    game_save_id = %id,
                    event_type = %event.event_type,
                    ready_at,
                    "Update cached, flush scheduled"
                );
            }
            HandlerOutcome::Persisted => {
                debug!(game_save_id = %id, event_type = %event.event_type, "Cache disabled, update persisted");
            }
        }
        Ok(())
    }
}
