//! Game Save Service Library
//!
//! 防抖写回缓存与刷新管道：
//! - `application`: 缓存开关、更新事件消费、刷新调度与刷新服务
//! - `infrastructure`: 事件流消费循环
//! - `app`: 由端口组装各组件

pub mod app;
pub mod application;
pub mod infrastructure;
