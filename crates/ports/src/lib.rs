//! ports - 抽象 trait 层
//!
//! 写回缓存依赖的所有基础设施接口：实体缓存、待刷新/处理中集合、
//! 持久化仓储以及事件流。

mod cache;
mod event_source;
mod flush_queue;
mod repository;

pub use cache::*;
pub use event_source::*;
pub use flush_queue::*;
pub use repository::*;
