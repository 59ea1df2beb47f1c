//! save-bootstrap - 服务启动骨架
//!
//! 运行时初始化、带重试的基础设施连接以及优雅关闭

mod infrastructure;
mod retry;
mod runtime;
mod shutdown;

pub use infrastructure::*;
pub use retry::*;
pub use runtime::*;
pub use shutdown::*;
