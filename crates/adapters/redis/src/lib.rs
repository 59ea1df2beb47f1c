//! save-adapter-redis - Redis 适配器
//!
//! 实体缓存、待刷新/处理中有序集合以及事件流的 Redis 实现

mod cache;
mod connection;
mod flush_queue;
mod keys;
mod stream;

pub use cache::*;
pub use connection::*;
pub use flush_queue::*;
pub use keys::*;
pub use stream::*;

use save_errors::AppError;

pub(crate) fn redis_error(op: &str, e: redis::RedisError) -> AppError {
    AppError::cache(format!("Redis {} failed: {}", op, e))
}
