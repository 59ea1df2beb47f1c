//! Cache trait 定义

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use save_common::GameSaveId;
use save_errors::AppResult;
use serde::{Serialize, de::DeserializeOwned};

/// 缓存的实体类型，每种类型一个独立的键空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKind {
    Characteristics,
    Currency,
    Stage,
    Metadata,
    Session,
}

impl CacheKind {
    pub const ALL: [CacheKind; 5] = [
        Self::Characteristics,
        Self::Currency,
        Self::Stage,
        Self::Metadata,
        Self::Session,
    ];

    /// 键前缀中的段
    pub fn segment(&self) -> &'static str {
        match self {
            Self::Characteristics => "characteristics",
            Self::Currency => "currency",
            Self::Stage => "stage",
            Self::Metadata => "metadata",
            Self::Session => "session",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// 可缓存的值
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// 单一实体类型的缓存
///
/// 覆盖写语义，没有合并；过期只是淘汰，不代表需要刷新。
#[async_trait]
pub trait CachePort<V: CacheValue>: Send + Sync {
    fn kind(&self) -> CacheKind;

    /// 获取缓存值，不存在或已过期返回 `None`
    async fn get(&self, id: &GameSaveId) -> AppResult<Option<V>>;

    /// 使用该类型的默认 TTL 写入
    async fn set(&self, id: &GameSaveId, value: &V) -> AppResult<()>;

    /// 指定 TTL 写入，`Duration::ZERO` 表示不过期
    async fn set_with_ttl(&self, id: &GameSaveId, value: &V, ttl: Duration) -> AppResult<()>;

    /// 删除，幂等
    async fn unset(&self, id: &GameSaveId) -> AppResult<()>;

    /// 当前所有条目的快照，不与并发写入保持事务一致
    ///
    /// 代价与条目数成正比，只在管理与启动路径调用
    async fn get_all(&self) -> AppResult<HashMap<GameSaveId, V>>;

    /// 删除该类型的所有条目
    async fn clear(&self) -> AppResult<()>;
}
