//! 内存持久化仓储

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use save_common::GameSaveId;
use save_errors::{AppError, AppResult};
use save_ports::EntityRepositoryPort;

struct State<V> {
    rows: HashMap<GameSaveId, V>,
    writes: HashMap<GameSaveId, usize>,
    failing: HashSet<GameSaveId>,
}

/// 只更新已存在行的仓储，可以对指定 id 注入写入失败
pub struct InMemoryRepository<V> {
    state: Mutex<State<V>>,
}

impl<V: Clone + Send + Sync> InMemoryRepository<V> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                rows: HashMap::new(),
                writes: HashMap::new(),
                failing: HashSet::new(),
            }),
        }
    }

    /// 创建行（存档生命周期之外的操作）
    pub fn insert(&self, id: GameSaveId, value: V) {
        self.state.lock().rows.insert(id, value);
    }

    pub fn remove(&self, id: &GameSaveId) {
        self.state.lock().rows.remove(id);
    }

    pub fn get(&self, id: &GameSaveId) -> Option<V> {
        self.state.lock().rows.get(id).cloned()
    }

    /// 成功写入次数
    pub fn write_count(&self, id: &GameSaveId) -> usize {
        self.state.lock().writes.get(id).copied().unwrap_or(0)
    }

    pub fn fail_writes_for(&self, id: GameSaveId) {
        self.state.lock().failing.insert(id);
    }

    pub fn heal(&self, id: &GameSaveId) {
        self.state.lock().failing.remove(id);
    }
}

impl<V: Clone + Send + Sync> Default for InMemoryRepository<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync> EntityRepositoryPort<V> for InMemoryRepository<V> {
    async fn find(&self, id: &GameSaveId) -> AppResult<Option<V>> {
        Ok(self.get(id))
    }

    async fn update(&self, id: &GameSaveId, value: &V) -> AppResult<()> {
        let mut state = self.state.lock();
        if state.failing.contains(id) {
            return Err(AppError::database(format!("Injected write failure for {}", id)));
        }
        let Some(row) = state.rows.get_mut(id) else {
            return Err(AppError::not_found(format!("No row for game save {}", id)));
        };
        *row = value.clone();
        *state.writes.entry(*id).or_default() += 1;
        Ok(())
    }
}
