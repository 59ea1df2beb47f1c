//! 存档更新事件
//!
//! 由游戏请求路径发出，写回缓存的唯一入口。负载统一为字符串映射，
//! 具体字段由事件类型决定。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use save_common::{GameSaveId, UserId};
use save_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CharacteristicsUpdate, Currency, Stage};

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameSaveEventType {
    CharacteristicsUpdate,
    StageUpdate,
    CurrencyUpdate,
}

impl GameSaveEventType {
    pub const ALL: [GameSaveEventType; 3] = [
        Self::CharacteristicsUpdate,
        Self::StageUpdate,
        Self::CurrencyUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharacteristicsUpdate => "CHARACTERISTICS_UPDATE",
            Self::StageUpdate => "STAGE_UPDATE",
            Self::CurrencyUpdate => "CURRENCY_UPDATE",
        }
    }
}

impl fmt::Display for GameSaveEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameSaveEventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AppError::validation(format!("Unknown event type: {}", s)))
    }
}

/// 一次存档变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSaveEvent {
    pub event_type: GameSaveEventType,
    pub game_save_id: GameSaveId,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: HashMap<String, String>,
}

impl GameSaveEvent {
    pub fn new(
        event_type: GameSaveEventType,
        game_save_id: GameSaveId,
        user_id: UserId,
        payload: HashMap<String, String>,
    ) -> Self {
        Self {
            event_type,
            game_save_id,
            user_id,
            session_id: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn currency(&self) -> AppResult<Currency> {
        self.expect_type(GameSaveEventType::CurrencyUpdate)?;
        Currency::from_payload(&self.payload)
    }

    pub fn stage(&self) -> AppResult<Stage> {
        self.expect_type(GameSaveEventType::StageUpdate)?;
        Stage::from_payload(&self.payload)
    }

    pub fn characteristics_update(&self) -> AppResult<CharacteristicsUpdate> {
        self.expect_type(GameSaveEventType::CharacteristicsUpdate)?;
        CharacteristicsUpdate::from_payload(&self.payload)
    }

    /// 流消息的字段形式：`payload` 是 JSON 对象，其余字段为纯字符串
    pub fn to_stream_fields(&self) -> AppResult<Vec<(String, String)>> {
        let payload = serde_json::to_string(&self.payload)
            .map_err(|e| AppError::serialization(format!("Failed to encode payload: {}", e)))?;
        let mut fields = vec![
            ("eventType".to_string(), self.event_type.as_str().to_string()),
            ("gameSaveId".to_string(), self.game_save_id.to_string()),
            ("userId".to_string(), self.user_id.to_string()),
            ("timestamp".to_string(), self.timestamp.to_rfc3339()),
            ("payload".to_string(), payload),
        ];
        if let Some(session_id) = self.session_id {
            fields.push(("sessionId".to_string(), session_id.to_string()));
        }
        Ok(fields)
    }

    /// 从流消息字段解码，任何缺失或格式错误都是 `Validation`
    pub fn from_stream_fields(fields: &HashMap<String, String>) -> AppResult<Self> {
        let field = |name: &str| {
            fields
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| AppError::validation(format!("Missing stream field '{}'", name)))
        };

        let event_type = field("eventType")?.parse()?;
        let game_save_id = field("gameSaveId")?
            .parse::<GameSaveId>()
            .map_err(|e| AppError::validation(format!("Invalid gameSaveId: {}", e)))?;
        let user_id = UserId::new(field("userId")?);
        let session_id = fields
            .get("sessionId")
            .filter(|s| !s.is_empty())
            .map(|s| Uuid::parse_str(s))
            .transpose()
            .map_err(|e| AppError::validation(format!("Invalid sessionId: {}", e)))?;
        let timestamp = match fields.get("timestamp") {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| AppError::validation(format!("Invalid timestamp: {}", e)))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };
        let payload = match fields.get("payload") {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| AppError::validation(format!("Invalid payload: {}", e)))?,
            None => HashMap::new(),
        };

        Ok(Self {
            event_type,
            game_save_id,
            user_id,
            session_id,
            timestamp,
            payload,
        })
    }

    fn expect_type(&self, expected: GameSaveEventType) -> AppResult<()> {
        if self.event_type != expected {
            return Err(AppError::validation(format!(
                "Expected {} payload, event is {}",
                expected, self.event_type
            )));
        }
        Ok(())
    }
}
