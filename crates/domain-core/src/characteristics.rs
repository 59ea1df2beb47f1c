//! 角色属性
//!
//! 属性是唯一支持部分更新的实体：事件只携带变化的字段，
//! 写入缓存前必须与上一次的完整值合并。

use std::collections::HashMap;

use save_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::payload::{non_negative, optional_i64};

/// 完整的属性值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Characteristics {
    pub attack: i64,
    pub crit_chance: i64,
    pub crit_damage: i64,
    pub health: i64,
    pub resistance: i64,
}

impl Default for Characteristics {
    fn default() -> Self {
        Self {
            attack: 1,
            crit_chance: 0,
            crit_damage: 0,
            health: 1,
            resistance: 0,
        }
    }
}

/// 部分属性更新，`None` 表示字段未变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicsUpdate {
    pub attack: Option<i64>,
    pub crit_chance: Option<i64>,
    pub crit_damage: Option<i64>,
    pub health: Option<i64>,
    pub resistance: Option<i64>,
}

impl CharacteristicsUpdate {
    /// 从更新事件负载解析；至少需要一个字段
    pub fn from_payload(payload: &HashMap<String, String>) -> AppResult<Self> {
        let update = Self {
            attack: checked(payload, "attack")?,
            crit_chance: checked(payload, "critChance")?,
            crit_damage: checked(payload, "critDamage")?,
            health: checked(payload, "health")?,
            resistance: checked(payload, "resistance")?,
        };
        if update.is_empty() {
            return Err(AppError::validation(
                "Characteristics update carries no field",
            ));
        }
        Ok(update)
    }

    pub fn is_empty(&self) -> bool {
        self.attack.is_none()
            && self.crit_chance.is_none()
            && self.crit_damage.is_none()
            && self.health.is_none()
            && self.resistance.is_none()
    }

    /// 所有字段都存在时可以直接当作完整值使用
    pub fn to_complete(&self) -> Option<Characteristics> {
        Some(Characteristics {
            attack: self.attack?,
            crit_chance: self.crit_chance?,
            crit_damage: self.crit_damage?,
            health: self.health?,
            resistance: self.resistance?,
        })
    }

    /// 把非空字段覆盖到 `base` 上
    pub fn merge_onto(&self, base: &Characteristics) -> Characteristics {
        Characteristics {
            attack: self.attack.unwrap_or(base.attack),
            crit_chance: self.crit_chance.unwrap_or(base.crit_chance),
            crit_damage: self.crit_damage.unwrap_or(base.crit_damage),
            health: self.health.unwrap_or(base.health),
            resistance: self.resistance.unwrap_or(base.resistance),
        }
    }
}

impl From<Characteristics> for CharacteristicsUpdate {
    fn from(value: Characteristics) -> Self {
        Self {
            attack: Some(value.attack),
            crit_chance: Some(value.crit_chance),
            crit_damage: Some(value.crit_damage),
            health: Some(value.health),
            resistance: Some(value.resistance),
        }
    }
}

fn checked(payload: &HashMap<String, String>, key: &str) -> AppResult<Option<i64>> {
    optional_i64(payload, key)?
        .map(|v| non_negative(key, v))
        .transpose()
}
