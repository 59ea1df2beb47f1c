//! 待刷新集合与处理中集合

use async_trait::async_trait;
use save_common::GameSaveId;
use save_errors::AppResult;

/// 集合中的一个成员及其分数（毫秒时间戳）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEntry {
    pub id: GameSaveId,
    pub score: i64,
}

/// 写回队列
///
/// 待刷新集合：`id -> readyAt`，分数越小越早可刷新。
/// 处理中集合：`id -> claimedAt`，在其中的 id 不能再次被认领。
/// 所有状态变更都必须依赖存储端的原子原语完成。
#[async_trait]
pub trait FlushQueuePort: Send + Sync {
    /// 写入或覆盖待刷新分数
    async fn schedule(&self, id: &GameSaveId, ready_at: i64) -> AppResult<()>;

    /// `readyAt <= now` 的所有 id
    async fn due(&self, now: i64) -> AppResult<Vec<GameSaveId>>;

    /// 原子认领：仅当 id 仍在待刷新集合且 `readyAt <= now` 时，
    /// 将其移入处理中集合，分数为 `now`。认领失败返回 `false`。
    async fn claim(&self, id: &GameSaveId, now: i64) -> AppResult<bool>;

    /// 忽略 `readyAt` 的原子认领，用于管理性的全量刷新
    async fn force_claim(&self, id: &GameSaveId, now: i64) -> AppResult<bool>;

    /// 从处理中集合移除
    async fn release(&self, id: &GameSaveId) -> AppResult<()>;

    async fn pending(&self) -> AppResult<Vec<ScheduledEntry>>;

    async fn processing(&self) -> AppResult<Vec<ScheduledEntry>>;

    /// 把 `claimedAt <= claimed_before` 的处理中条目原子地放回待刷新集合，
    /// `readyAt = now`。返回被放回的 id。
    async fn requeue_stale(&self, claimed_before: i64, now: i64) -> AppResult<Vec<GameSaveId>>;
}
