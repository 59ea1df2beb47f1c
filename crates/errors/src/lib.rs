//! save-errors - 统一错误处理

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    /// 远程缓存不可用或命令执行失败
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 持久化层找不到对应记录（例如存档已被删除）
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// 重试可能成功的错误：存储或网络层面的失败
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Cache(_) | Self::Database(_) | Self::Internal(_))
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = AppError::cache("connection refused");
        assert_eq!(err.to_string(), "Cache error: connection refused");
    }

    #[test]
    fn test_classification() {
        assert!(AppError::not_found("game save").is_not_found());
        assert!(!AppError::not_found("game save").is_transient());
        assert!(AppError::cache("timeout").is_transient());
        assert!(AppError::database("deadlock").is_transient());
        assert!(!AppError::validation("gold < 0").is_transient());
        assert!(!AppError::serialization("bad json").is_transient());
    }
}
