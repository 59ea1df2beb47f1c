//! Graceful Shutdown

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown 控制器
///
/// 后台任务持有子 token；触发后任务停止接收新工作，并在限定时间内排空。
#[derive(Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        info!("Triggering shutdown");
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// 按顺序排空多个任务，所有任务共享同一个截止时间，超时的任务被强制中止
///
/// 返回是否全部在时限内自行结束。
pub async fn drain_tasks(tasks: Vec<(&str, JoinHandle<()>)>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut all_stopped = true;
    for (name, handle) in tasks {
        all_stopped &= drain_until(name, handle, deadline).await;
    }
    all_stopped
}

async fn drain_until(name: &str, mut handle: JoinHandle<()>, deadline: Instant) -> bool {
    match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(())) => {
            info!(task = name, "Task stopped");
            true
        }
        Ok(Err(e)) => {
            warn!(task = name, error = %e, "Task ended abnormally");
            true
        }
        Err(_) => {
            warn!(task = name, "Task did not stop before shutdown deadline, aborting");
            handle.abort();
            false
        }
    }
}
