//! save-adapter-memory - 进程内适配器
//!
//! 所有端口的内存实现，用于测试与本地运行。过期时间基于注入的时钟，
//! 测试可以用 `ManualClock` 精确推进。

mod cache;
mod event_source;
mod flush_queue;
mod repository;

pub use cache::*;
pub use event_source::*;
pub use flush_queue::*;
pub use repository::*;
