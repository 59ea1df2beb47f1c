//! save-adapter-postgres - PostgreSQL 适配器
//!
//! 存档各实体的持久化存储。写回缓存只做按字段覆盖的 UPDATE，
//! 行的创建与删除属于存档生命周期，不在这里处理。

mod characteristics;
mod connection;
mod currency;
mod error_mapper;
mod stage;

pub use characteristics::*;
pub use connection::*;
pub use currency::*;
pub use error_mapper::*;
pub use stage::*;
