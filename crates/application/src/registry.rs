//! 实时连接注册表
//!
//! 注册表独占所有连接的生命周期与存活状态。每个连接拥有一个有界发送队列，
//! 广播只做非阻塞入队，单个连接的队列满或已关闭不会影响其他连接。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use domain::ConnectionId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 发往单个连接的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// 已序列化的 JSON 文本，所有连接共享同一份
    Text(Arc<str>),
    /// 存活探测
    Ping,
}

impl OutboundFrame {
    pub fn text(payload: impl Into<Arc<str>>) -> Self {
        Self::Text(payload.into())
    }
}

/// 连接存活状态：`Alive ⇄ Probing → 淘汰`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Probing,
}

/// 一次探测的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 已切换到 `Probing` 并发出探测
    Probed,
    /// 自上次探测后没有回应，或连接已关闭
    Unresponsive,
}

/// 一次广播的投递统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

/// `register` 返回给连接处理器的句柄
#[derive(Debug)]
pub struct RegisteredConnection {
    pub id: ConnectionId,
    /// 该连接的发送队列，注册表淘汰连接后队列在排空后结束
    pub outbound: mpsc::Receiver<OutboundFrame>,
    /// 被淘汰时取消
    pub closed: CancellationToken,
}

struct ConnectionEntry {
    sender: mpsc::Sender<OutboundFrame>,
    liveness: Liveness,
    closed: CancellationToken,
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    outbound_buffer: usize,
}

impl ConnectionRegistry {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// 登记新连接，初始状态为 `Alive`
    pub fn register(&self) -> RegisteredConnection {
        let id = ConnectionId::new();
        let (sender, outbound) = mpsc::channel(self.outbound_buffer);
        let closed = CancellationToken::new();

        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                ConnectionEntry {
                    sender,
                    liveness: Liveness::Alive,
                    closed: closed.clone(),
                },
            );

        info!(connection_id = %id, "connection registered");
        RegisteredConnection {
            id,
            outbound,
            closed,
        }
    }

    /// 收到对端回应后恢复为 `Alive`
    pub fn mark_alive(&self, id: ConnectionId) {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = connections.get_mut(&id) {
            entry.liveness = Liveness::Alive;
        }
    }

    pub fn liveness(&self, id: ConnectionId) -> Option<Liveness> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|entry| entry.liveness)
    }

    /// 心跳状态迁移：`Alive` 切换为 `Probing` 并入队探测帧；已在 `Probing` 则报告无响应。
    ///
    /// 未知连接返回 `None`。
    pub fn probe(&self, id: ConnectionId) -> Option<ProbeOutcome> {
        let mut connections = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = connections.get_mut(&id)?;

        if entry.liveness == Liveness::Probing {
            return Some(ProbeOutcome::Unresponsive);
        }

        entry.liveness = Liveness::Probing;
        match entry.sender.try_send(OutboundFrame::Ping) {
            Ok(()) => Some(ProbeOutcome::Probed),
            // 队列积压时不补发，下个周期仍无回应即淘汰
            Err(TrySendError::Full(_)) => {
                debug!(connection_id = %id, "outbound queue full, probe skipped");
                Some(ProbeOutcome::Probed)
            }
            Err(TrySendError::Closed(_)) => Some(ProbeOutcome::Unresponsive),
        }
    }

    /// 向所有已登记连接投递同一负载
    pub fn publish(&self, payload: Arc<str>) -> PublishReport {
        let mut report = PublishReport::default();
        let mut closed = Vec::new();

        {
            let connections = self
                .connections
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for (id, entry) in connections.iter() {
                match entry.sender.try_send(OutboundFrame::Text(payload.clone())) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        report.dropped += 1;
                        warn!(connection_id = %id, "delivery failure: outbound queue full, frame dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        report.closed += 1;
                        closed.push(*id);
                    }
                }
            }
        }

        for id in closed {
            self.evict(id);
        }

        report
    }

    /// 仅向指定连接投递
    pub fn send_to(&self, id: ConnectionId, frame: OutboundFrame) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|entry| entry.sender.try_send(frame).is_ok())
            .unwrap_or(false)
    }

    /// 移除并关闭连接，可重复调用
    pub fn evict(&self, id: ConnectionId) -> bool {
        let removed = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match removed {
            Some(entry) => {
                entry.closed.cancel();
                info!(connection_id = %id, "connection evicted");
                true
            }
            None => false,
        }
    }

    /// 当前成员的副本，供心跳巡检遍历
    pub fn snapshot(&self) -> Vec<ConnectionId> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 关停时关闭全部连接
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (_, entry) in &drained {
            entry.closed.cancel();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "closed all connections");
        }
        drained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(text: &str) -> Arc<str> {
        Arc::from(text)
    }

    #[tokio::test]
    async fn test_publish_reaches_every_connection() {
        let registry = ConnectionRegistry::new(8);
        let mut first = registry.register();
        let mut second = registry.register();

        let report = registry.publish(payload("hello"));
        assert_eq!(report.delivered, 2);

        assert_eq!(
            first.outbound.recv().await,
            Some(OutboundFrame::text("hello"))
        );
        assert_eq!(
            second.outbound.recv().await,
            Some(OutboundFrame::text("hello"))
        );
    }

    #[tokio::test]
    async fn test_full_queue_only_drops_for_that_connection() {
        let registry = ConnectionRegistry::new(1);
        let _stalled = registry.register();
        let mut healthy = registry.register();

        registry.publish(payload("one"));
        assert_eq!(
            healthy.outbound.recv().await,
            Some(OutboundFrame::text("one"))
        );

        // 第一个连接从不读取，队列已满
        let report = registry.publish(payload("two"));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(
            healthy.outbound.recv().await,
            Some(OutboundFrame::text("two"))
        );
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_evicted_on_publish() {
        let registry = ConnectionRegistry::new(4);
        let gone = registry.register();
        let _kept = registry.register();
        drop(gone.outbound);

        let report = registry.publish(payload("x"));
        assert_eq!(report.closed, 1);
        assert_eq!(registry.len(), 1);
        assert!(gone.closed.is_cancelled());
    }

    #[tokio::test]
    async fn test_evict_is_idempotent_and_closes_queue() {
        let registry = ConnectionRegistry::new(4);
        let mut connection = registry.register();

        assert!(registry.evict(connection.id));
        assert!(!registry.evict(connection.id));
        assert!(connection.closed.is_cancelled());
        assert_eq!(connection.outbound.recv().await, None);
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_probe_transitions() {
        let registry = ConnectionRegistry::new(4);
        let mut connection = registry.register();
        let id = connection.id;

        assert_eq!(registry.liveness(id), Some(Liveness::Alive));
        assert_eq!(registry.probe(id), Some(ProbeOutcome::Probed));
        assert_eq!(registry.liveness(id), Some(Liveness::Probing));
        assert_eq!(connection.outbound.recv().await, Some(OutboundFrame::Ping));

        registry.mark_alive(id);
        assert_eq!(registry.liveness(id), Some(Liveness::Alive));

        registry.probe(id);
        assert_eq!(registry.probe(id), Some(ProbeOutcome::Unresponsive));
        assert_eq!(registry.probe(ConnectionId::new()), None);
    }

    #[tokio::test]
    async fn test_close_all_cancels_every_connection() {
        let registry = ConnectionRegistry::new(4);
        let a = registry.register();
        let b = registry.register();

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(a.closed.is_cancelled());
        assert!(b.closed.is_cancelled());
    }
}
