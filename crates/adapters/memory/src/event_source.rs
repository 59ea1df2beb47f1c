//! 内存事件流
//!
//! 模拟消费组语义：读出的消息在确认前保持待处理，空闲足够久可以被重新认领。

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use save_errors::AppResult;
use save_ports::{EventSourcePort, StreamDelivery};

#[derive(Default)]
struct StreamState {
    next_seq: u64,
    queue: VecDeque<StreamDelivery>,
    pending: HashMap<String, (StreamDelivery, Instant)>,
    acked: Vec<String>,
}

#[derive(Default)]
pub struct InMemoryEventSource {
    state: Mutex<StreamState>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条消息，返回消息 ID
    pub fn push(&self, fields: HashMap<String, String>) -> String {
        let mut state = self.state.lock();
        state.next_seq += 1;
        let entry_id = format!("{}-0", state.next_seq);
        state.queue.push_back(StreamDelivery {
            entry_id: entry_id.clone(),
            fields,
        });
        entry_id
    }

    pub fn acked(&self) -> Vec<String> {
        self.state.lock().acked.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[async_trait]
impl EventSourcePort for InMemoryEventSource {
    async fn ensure_group(&self) -> AppResult<()> {
        Ok(())
    }

    async fn read(&self, count: usize, block_ms: usize) -> AppResult<Vec<StreamDelivery>> {
        let batch: Vec<StreamDelivery> = {
            let mut state = self.state.lock();
            let take = count.min(state.queue.len());
            let batch: Vec<_> = state.queue.drain(..take).collect();
            let now = Instant::now();
            for delivery in &batch {
                state
                    .pending
                    .insert(delivery.entry_id.clone(), (delivery.clone(), now));
            }
            batch
        };

        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(block_ms as u64)).await;
        }
        Ok(batch)
    }

    async fn ack(&self, entry_ids: &[String]) -> AppResult<()> {
        let mut state = self.state.lock();
        for id in entry_ids {
            if state.pending.remove(id).is_some() {
                state.acked.push(id.clone());
            }
        }
        Ok(())
    }

    async fn reclaim(&self, min_idle_ms: u64, count: usize) -> AppResult<Vec<StreamDelivery>> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let min_idle = Duration::from_millis(min_idle_ms);

        let mut reclaimed: Vec<StreamDelivery> = Vec::new();
        for (delivery, delivered_at) in state.pending.values_mut() {
            if reclaimed.len() >= count {
                break;
            }
            if now.duration_since(*delivered_at) >= min_idle {
                *delivered_at = now;
                reclaimed.push(delivery.clone());
            }
        }
        reclaimed.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        Ok(reclaimed)
    }
}
