//! 服务运行时

use save_config::AppConfig;
use save_errors::AppResult;
use save_telemetry::{init_metrics, init_tracing, init_tracing_json};
use tracing::info;

/// 初始化日志与指标
pub fn init_runtime(config: &AppConfig) -> AppResult<()> {
    if config.is_production() {
        init_tracing_json(&config.telemetry.log_level);
    } else {
        init_tracing(&config.telemetry.log_level);
    }

    init_metrics(config.telemetry.metrics_addr.as_deref())?;

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        metrics_addr = ?config.telemetry.metrics_addr,
        "Runtime initialized"
    );
    Ok(())
}

/// 等待关闭信号
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
