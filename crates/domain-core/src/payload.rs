//! 事件负载解析
//!
//! 负载是 `map<string, string>`，数值字段以十进制字符串传输。

use std::collections::HashMap;

use save_errors::{AppError, AppResult};

pub(crate) fn optional_i64(payload: &HashMap<String, String>, key: &str) -> AppResult<Option<i64>> {
    match payload.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|e| AppError::validation(format!("Invalid value for '{}': {}", key, e))),
    }
}

pub(crate) fn required_i64(payload: &HashMap<String, String>, key: &str) -> AppResult<i64> {
    optional_i64(payload, key)?
        .ok_or_else(|| AppError::validation(format!("Missing field '{}'", key)))
}

pub(crate) fn non_negative(field: &str, value: i64) -> AppResult<i64> {
    if value < 0 {
        return Err(AppError::validation(format!(
            "'{}' must not be negative, got {}",
            field, value
        )));
    }
    Ok(value)
}
