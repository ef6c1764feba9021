//! 主应用程序入口
//!
//! 加载配置、连接便签存储、启动心跳巡检与 Axum Web 服务。

use std::{net::SocketAddr, sync::Arc};

use application::{
    BroadcastHub, BroadcastHubDependencies, Clock, ConnectionRegistry, HeartbeatMonitor,
    HubSettings, SubmissionRateLimiter, SystemClock,
};
use config::AppConfig;
use infrastructure::build_note_repository;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "configuration loaded");

    // 存储不可用时直接退出，不对外提供服务
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let note_repository = build_note_repository(&config.storage, clock).await?;

    let registry = Arc::new(ConnectionRegistry::new(config.realtime.outbound_buffer));
    let hub = Arc::new(BroadcastHub::new(
        BroadcastHubDependencies {
            note_repository,
            registry: registry.clone(),
        },
        HubSettings {
            storage_timeout: config.storage.timeout(),
            snapshot_policy: config.realtime.snapshot_policy,
        },
    ));
    let rate_limiter = Arc::new(SubmissionRateLimiter::new(
        config.rate_limit.max_submissions,
        config.rate_limit.window(),
    ));

    let shutdown = CancellationToken::new();
    let heartbeat = HeartbeatMonitor::new(registry.clone(), config.realtime.heartbeat_interval())
        .spawn(shutdown.clone());

    let app = router(AppState::new(hub, rate_limiter), &config.server);
    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("便签服务启动在 http://{}", bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown, registry))
    .await?;

    if let Err(err) = heartbeat.await {
        tracing::warn!(error = %err, "heartbeat task ended abnormally");
    }
    tracing::info!("server stopped");

    Ok(())
}

/// 收到 Ctrl+C 后停止心跳巡检并关闭全部实时连接
async fn shutdown_signal(shutdown: CancellationToken, registry: Arc<ConnectionRegistry>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
    let closed = registry.close_all();
    tracing::info!(closed, "shutdown signal received");
}
