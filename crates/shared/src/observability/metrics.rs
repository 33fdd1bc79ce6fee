//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl MetricsHandle {
    /// 停止指标 HTTP 服务器
    pub fn abort(self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "ticket_operations_total",
        "Total number of ticket operations by outcome"
    );
    metrics::describe_counter!(
        "ticket_transitions_total",
        "Total number of ticket status transitions"
    );
    metrics::describe_counter!(
        "notification_channel_total",
        "Per-recipient notification channel outcomes"
    );
    metrics::describe_counter!("push_tokens_total", "Push delivery outcomes per device token");
    metrics::describe_gauge!("realtime_connections", "Open realtime connections");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("指标服务监听于 {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("指标服务异常: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录工单操作结果
#[inline]
pub fn record_ticket_operation(operation: &'static str, result: &'static str) {
    metrics::counter!(
        "ticket_operations_total",
        "operation" => operation,
        "result" => result
    )
    .increment(1);
}

/// 记录状态迁移
#[inline]
pub fn record_ticket_transition(from: &'static str, to: &'static str) {
    metrics::counter!("ticket_transitions_total", "from" => from, "to" => to).increment(1);
}

/// 记录单个通道的投递结果
#[inline]
pub fn record_notification_channel(channel: &'static str, result: &'static str) {
    metrics::counter!(
        "notification_channel_total",
        "channel" => channel,
        "result" => result
    )
    .increment(1);
}

/// 记录推送令牌结果（delivered / pruned / dropped）
#[inline]
pub fn record_push_tokens(result: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    metrics::counter!("push_tokens_total", "result" => result).increment(count as u64);
}

/// 更新实时连接数
#[inline]
pub fn set_realtime_connections(count: usize) {
    metrics::gauge!("realtime_connections").set(count as f64);
}
