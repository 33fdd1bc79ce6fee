//! 宽带工单服务
//!
//! 启动实时网关，工单与通知服务在进程内装配。

use std::sync::Arc;

use helpdesk_shared::{
    config::{AppConfig, StorageBackend},
    database::Database,
    observability,
};
use ticket_service::{
    Repositories, TicketApp,
    app::push_provider,
    gateway::{self, GatewayState},
    repository::MemoryStore,
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("ticket-service").unwrap_or_default();
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!("Starting ticket-service on {}", config.server_addr());

    // 数据库连接在整个服务生命周期内保持，关闭时显式释放
    let (repos, database) = match config.storage.backend {
        StorageBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            if config.database.run_migrations {
                db.run_migrations(&MIGRATOR).await?;
            }
            (Repositories::postgres(db.pool().clone()), Some(db))
        }
        StorageBackend::Memory => {
            warn!("使用内存存储，服务重启后数据将丢失");
            (Repositories::memory(Arc::new(MemoryStore::new())), None)
        }
    };

    let provider = push_provider(&config.notification.push)?;
    let app = TicketApp::build(repos, provider, &config.notification);

    let router = gateway::router(GatewayState {
        bus: app.bus.clone(),
        tickets: app.tickets.clone(),
        comments: app.comments.clone(),
    });

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Realtime gateway listening on {}", config.server_addr());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app.shutdown().await;
    if let Some(db) = database {
        db.close().await;
    }

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
