//! 游戏会话

use chrono::{DateTime, Utc};
use save_common::GameSaveId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub id: Uuid,
    pub game_save_id: GameSaveId,
    pub end_time: DateTime<Utc>,
    pub cancelled: bool,
}

impl GameSession {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.cancelled && self.end_time > now
    }
}
