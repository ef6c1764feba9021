#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    BroadcastHub, BroadcastHubDependencies, ConnectionRegistry, HeartbeatMonitor, HubSettings,
    SubmissionRateLimiter, SystemClock,
};
use config::{AppConfig, SnapshotPolicy};
use infrastructure::InMemoryNoteRepository;
use tokio::{net::TcpListener, sync::oneshot, time::sleep};
use tokio_util::sync::CancellationToken;
use web_api::{router, AppState};

pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<ConnectionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    heartbeat: CancellationToken,
}

impl TestServer {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.heartbeat.cancel();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limit.max_submissions = 1000;
    config
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with(test_config()).await
}

pub async fn spawn_server_with_heartbeat(interval_secs: u64) -> TestServer {
    let mut config = test_config();
    config.realtime.heartbeat_interval_secs = interval_secs;
    spawn_server_with(config).await
}

pub async fn spawn_server_with_policy(policy: SnapshotPolicy) -> TestServer {
    let mut config = test_config();
    config.realtime.snapshot_policy = policy;
    spawn_server_with(config).await
}

/// 使用内存存储启动完整路由，监听随机端口
pub async fn spawn_server_with(config: AppConfig) -> TestServer {
    let repository = Arc::new(InMemoryNoteRepository::new(Arc::new(SystemClock)));
    let registry = Arc::new(ConnectionRegistry::new(config.realtime.outbound_buffer));
    let hub = Arc::new(BroadcastHub::new(
        BroadcastHubDependencies {
            note_repository: repository,
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
    let app = router(AppState::new(hub, rate_limiter), &config.server);

    let heartbeat = CancellationToken::new();
    HeartbeatMonitor::new(registry.clone(), config.realtime.heartbeat_interval())
        .spawn(heartbeat.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await
        .ok();
    });

    // allow server to start
    sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        registry,
        shutdown: Some(shutdown_tx),
        heartbeat,
    }
}
