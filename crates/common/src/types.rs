//! 通用类型定义

use std::str::FromStr;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 存档 ID
///
/// 缓存键、待刷新集合成员以及持久化行主键都使用它的字符串形式。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct GameSaveId(pub Uuid);

impl GameSaveId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GameSaveId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for GameSaveId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// 用户 ID（来自认证系统，这里只透传）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_save_id_roundtrips_through_string() {
        let id = GameSaveId::new();
        let parsed: GameSaveId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_game_save_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<GameSaveId>().is_err());
    }

    #[test]
    fn test_game_save_id_serializes_as_plain_string() {
        let id = GameSaveId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
