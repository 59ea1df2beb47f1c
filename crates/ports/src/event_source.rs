//! 事件流 trait 定义

use std::collections::HashMap;

use async_trait::async_trait;
use save_errors::AppResult;

/// 流中的一条消息（至少一次投递）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDelivery {
    pub entry_id: String,
    pub fields: HashMap<String, String>,
}

/// 消费组语义的事件来源
#[async_trait]
pub trait EventSourcePort: Send + Sync {
    /// 创建消费组，已存在时不报错
    async fn ensure_group(&self) -> AppResult<()>;

    /// 读取新消息，最多阻塞 `block_ms`
    async fn read(&self, count: usize, block_ms: usize) -> AppResult<Vec<StreamDelivery>>;

    async fn ack(&self, entry_ids: &[String]) -> AppResult<()>;

    /// 认领空闲超过 `min_idle_ms` 的未确认消息
    async fn reclaim(&self, min_idle_ms: u64, count: usize) -> AppResult<Vec<StreamDelivery>>;
}
