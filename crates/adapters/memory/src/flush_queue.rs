//! 内存写回队列
//!
//! 两个集合放在同一把锁下，认领与回收天然原子。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use save_common::GameSaveId;
use save_errors::{AppError, AppResult};
use save_ports::{FlushQueuePort, ScheduledEntry};

#[derive(Default)]
struct Sets {
    pending: HashMap<GameSaveId, i64>,
    processing: HashMap<GameSaveId, i64>,
}

#[derive(Default)]
pub struct InMemoryFlushQueue {
    sets: Mutex<Sets>,
    unavailable: AtomicBool,
}

impl InMemoryFlushQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟存储不可用，之后的所有调用返回 `AppError::Cache`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn pending_score(&self, id: &GameSaveId) -> Option<i64> {
        self.sets.lock().pending.get(id).copied()
    }

    pub fn processing_score(&self, id: &GameSaveId) -> Option<i64> {
        self.sets.lock().processing.get(id).copied()
    }

    fn check(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::cache("In-memory flush queue marked unavailable"));
        }
        Ok(())
    }

    fn claim_if(&self, id: &GameSaveId, now: i64, eligible: impl FnOnce(i64) -> bool) -> AppResult<bool> {
        self.check()?;
        let mut sets = self.sets.lock();
        let Some(&score) = sets.pending.get(id) else {
            return Ok(false);
        };
        if sets.processing.contains_key(id) || !eligible(score) {
            return Ok(false);
        }
        sets.pending.remove(id);
        sets.processing.insert(*id, now);
        Ok(true)
    }
}

fn sorted(map: &HashMap<GameSaveId, i64>) -> Vec<ScheduledEntry> {
    let mut entries: Vec<_> = map
        .iter()
        .map(|(id, score)| ScheduledEntry { id: *id, score: *score })
        .collect();
    entries.sort_by_key(|e| (e.score, e.id));
    entries
}

#[async_trait]
impl FlushQueuePort for InMemoryFlushQueue {
    async fn schedule(&self, id: &GameSaveId, ready_at: i64) -> AppResult<()> {
        self.check()?;
        self.sets.lock().pending.insert(*id, ready_at);
        Ok(())
    }

    async fn due(&self, now: i64) -> AppResult<Vec<GameSaveId>> {
        self.check()?;
        let sets = self.sets.lock();
        Ok(sorted(&sets.pending)
            .into_iter()
            .filter(|e| e.score <= now)
            .map(|e| e.id)
            .collect())
    }

    async fn claim(&self, id: &GameSaveId, now: i64) -> AppResult<bool> {
        self.claim_if(id, now, |ready_at| ready_at <= now)
    }

    async fn force_claim(&self, id: &GameSaveId, now: i64) -> AppResult<bool> {
        self.claim_if(id, now, |_| true)
    }

    async fn release(&self, id: &GameSaveId) -> AppResult<()> {
        self.check()?;
        self.sets.lock().processing.remove(id);
        Ok(())
    }

    async fn pending(&self) -> AppResult<Vec<ScheduledEntry>> {
        self.check()?;
        Ok(sorted(&self.sets.lock().pending))
    }

    async fn processing(&self) -> AppResult<Vec<ScheduledEntry>> {
        self.check()?;
        Ok(sorted(&self.sets.lock().processing))
    }

    async fn requeue_stale(&self, claimed_before: i64, now: i64) -> AppResult<Vec<GameSaveId>> {
        self.check()?;
        let mut sets = self.sets.lock();
        let stale: Vec<GameSaveId> = sorted(&sets.processing)
            .into_iter()
            .filter(|e| e.score <= claimed_before)
            .map(|e| e.id)
            .collect();

        for id in &stale {
            sets.processing.remove(id);
            sets.pending.entry(*id).or_insert(now);
        }
        Ok(stale)
    }
}
