//! domain-core - 存档领域类型
//!
//! 缓存与持久化共享的值对象，以及驱动写回缓存的更新事件

mod characteristics;
mod currency;
mod event;
mod metadata;
mod payload;
mod session;
mod stage;

pub use characteristics::*;
pub use currency::*;
pub use event::*;
pub use metadata::*;
pub use session::*;
pub use stage::*;

// Re-export common types
pub use save_common::{GameSaveId, UserId};
