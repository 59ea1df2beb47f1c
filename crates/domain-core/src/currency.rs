//! 货币值对象

use std::collections::HashMap;

use save_errors::AppResult;
use serde::{Deserialize, Serialize};

use crate::payload::{non_negative, required_i64};

/// 存档持有的四种货币，均为非负整数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub gold: i64,
    pub diamond: i64,
    pub emerald: i64,
    pub amethyst: i64,
}

impl Currency {
    pub fn new(gold: i64, diamond: i64, emerald: i64, amethyst: i64) -> AppResult<Self> {
        Ok(Self {
            gold: non_negative("gold", gold)?,
            diamond: non_negative("diamond", diamond)?,
            emerald: non_negative("emerald", emerald)?,
            amethyst: non_negative("amethyst", amethyst)?,
        })
    }

    /// 从更新事件负载解析，四个字段都必须存在
    pub fn from_payload(payload: &HashMap<String, String>) -> AppResult<Self> {
        Self::new(
            required_i64(payload, "gold")?,
            required_i64(payload, "diamond")?,
            required_i64(payload, "emerald")?,
            required_i64(payload, "amethyst")?,
        )
    }
}
