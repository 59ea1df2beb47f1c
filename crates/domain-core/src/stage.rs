//! 关卡进度

use std::collections::HashMap;

use save_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::payload::required_i64;

/// 当前关卡与历史最高关卡
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub current_stage: i64,
    pub max_stage: i64,
}

impl Stage {
    pub fn new(current_stage: i64, max_stage: i64) -> AppResult<Self> {
        if current_stage < 1 || max_stage < 1 {
            return Err(AppError::validation(format!(
                "Stages start at 1, got currentStage={} maxStage={}",
                current_stage, max_stage
            )));
        }
        if current_stage > max_stage {
            return Err(AppError::validation(format!(
                "currentStage ({}) cannot exceed maxStage ({})",
                current_stage, max_stage
            )));
        }
        Ok(Self {
            current_stage,
            max_stage,
        })
    }

    pub fn from_payload(payload: &HashMap<String, String>) -> AppResult<Self> {
        Self::new(
            required_i64(payload, "currentStage")?,
            required_i64(payload, "maxStage")?,
        )
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self {
            current_stage: 1,
            max_stage: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_cannot_exceed_max() {
        assert!(Stage::new(5, 4).is_err());
        assert!(Stage::new(4, 4).is_ok());
    }

    #[test]
    fn test_zero_stage_rejected() {
        assert!(Stage::new(0, 3).is_err());
    }

    #[test]
    fn test_from_payload() {
        let payload: HashMap<String, String> = [("currentStage", "3"), ("maxStage", "7")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(Stage::from_payload(&payload).unwrap(), Stage::new(3, 7).unwrap());
    }
}
