//! 心跳巡检
//!
//! 一个共享的周期性 tick 驱动全部连接：上次探测后仍未回应的连接被淘汰，
//! 其余连接切换为 `Probing` 并收到新的探测。用于发现对端已消失但 TCP 仍显示打开的半开连接。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::{ConnectionRegistry, ProbeOutcome};

/// 一次巡检的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: usize,
}

pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// 对当前所有连接执行一次巡检
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for id in self.registry.snapshot() {
            match self.registry.probe(id) {
                Some(ProbeOutcome::Probed) => report.probed += 1,
                Some(ProbeOutcome::Unresponsive) => {
                    if self.registry.evict(id) {
                        info!(connection_id = %id, "evicting unresponsive connection");
                        report.evicted += 1;
                    }
                }
                // 巡检期间已断开
                None => {}
            }
        }

        debug!(
            probed = report.probed,
            evicted = report.evicted,
            "heartbeat sweep finished"
        );
        report
    }

    /// 在后台按固定周期巡检，直到 `shutdown` 被取消
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval 的第一次 tick 立即完成
            ticker.tick().await;

            info!(interval_secs = self.interval.as_secs(), "heartbeat monitor started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
            info!("heartbeat monitor stopped");
        })
    }
}
