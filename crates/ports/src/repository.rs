//! Repository trait 定义

use async_trait::async_trait;
use save_common::GameSaveId;
use save_errors::AppResult;

/// 持久化存储中的单一实体类型
#[async_trait]
pub trait EntityRepositoryPort<V>: Send + Sync {
    async fn find(&self, id: &GameSaveId) -> AppResult<Option<V>>;

    /// 按字段覆盖更新，行不存在时返回 `AppError::NotFound`
    async fn update(&self, id: &GameSaveId, value: &V) -> AppResult<()>;
}
