//! telemetry - 可观测性库
//!
//! tracing 初始化、Prometheus 导出以及写回管道的指标记录

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use save_errors::{AppError, AppResult};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 刷新结果计数器
pub const FLUSH_TOTAL: &str = "game_save_flush_total";
/// 调度周期计数器
pub const FLUSH_CYCLE_TOTAL: &str = "game_save_flush_cycle_total";
/// 处理集合中滞留的条目数
pub const PROCESSING_STUCK: &str = "game_save_processing_stuck";
/// 消费的事件计数器
pub const EVENTS_CONSUMED_TOTAL: &str = "game_save_events_consumed_total";

/// 初始化 tracing
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// 安装 Prometheus recorder
///
/// 指定 `listen_addr` 时同时启动抓取端点（需要在 tokio 运行时内调用）。
pub fn init_metrics(listen_addr: Option<&str>) -> AppResult<Option<PrometheusHandle>> {
    match listen_addr {
        Some(addr) => {
            let addr: SocketAddr = addr.parse().map_err(|e| {
                AppError::configuration(format!("Invalid metrics address '{}': {}", addr, e))
            })?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| AppError::internal(format!("Failed to start Prometheus exporter: {}", e)))?;
            Ok(None)
        }
        None => PrometheusBuilder::new()
            .install_recorder()
            .map(Some)
            .map_err(|e| AppError::internal(format!("Failed to install Prometheus recorder: {}", e))),
    }
}

/// 单个存档刷新的结果
pub fn record_flush(result: &'static str) {
    counter!(FLUSH_TOTAL, "result" => result).increment(1);
}

pub fn record_flush_cycle(outcome: &'static str) {
    counter!(FLUSH_CYCLE_TOTAL, "outcome" => outcome).increment(1);
}

pub fn set_processing_stuck(count: usize) {
    gauge!(PROCESSING_STUCK).set(count as f64);
}

/// `outcome`: applied / rejected / failed
pub fn record_event(event_type: &'static str, outcome: &'static str) {
    counter!(EVENTS_CONSUMED_TOTAL, "event_type" => event_type, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_metrics_addr() {
        let err = init_metrics(Some("not-an-address")).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_record_without_recorder() {
        // 未安装 recorder 时记录是空操作
        record_flush("success");
        record_flush_cycle("completed");
        set_processing_stuck(0);
        record_event("CURRENCY_UPDATE", "applied");
    }
}
