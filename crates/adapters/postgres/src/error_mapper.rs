//! 数据库错误映射
//!
//! 提供统一的 SQLx 错误到 AppError 的转换

use save_errors::AppError;

/// 将 SQLx 错误转换为 AppError，区分不同错误类型
pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::not_found("Record not found"),
        sqlx::Error::Database(db_err) => match db_err.code() {
            // PostgreSQL 约束违规代码
            Some(code) => match code.as_ref() {
                "23514" => AppError::validation("Check constraint violation"),
                "23502" => AppError::validation("Not null constraint violation"),
                _ => AppError::database(format!("Database error ({}): {}", code, db_err)),
            },
            None => AppError::database(db_err.to_string()),
        },
        sqlx::Error::PoolTimedOut => AppError::database("Database connection pool timeout"),
        sqlx::Error::PoolClosed => AppError::database("Database connection pool is closed"),
        _ => AppError::database(e.to_string()),
    }
}

/// UPDATE 未命中任何行时的错误
pub(crate) fn ensure_updated(rows_affected: u64, table: &str, id: &impl std::fmt::Display) -> Result<(), AppError> {
    if rows_affected == 0 {
        return Err(AppError::not_found(format!("No {} row for game save {}", table, id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
    }

    #[test]
    fn test_ensure_updated() {
        assert!(ensure_updated(1, "currency", &"g1").is_ok());
        assert!(ensure_updated(0, "currency", &"g1").unwrap_err().is_not_found());
    }
}
