use application::{OutboundFrame, RegisteredConnection};
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;

use crate::state::AppState;

/// 服务端异常时的关闭码
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// 被淘汰后等待写任务发出 Close 帧的上限
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// 单个实时连接
///
/// 写任务把注册表队列中的帧写入 socket，读任务把 pong 回报给注册表。
/// 任一任务结束或连接被淘汰时，从注册表移除连接。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    connection: RegisteredConnection,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, connection: RegisteredConnection) -> Self {
        Self {
            socket,
            state,
            connection,
        }
    }

    /// 无法加入频道时直接关闭
    pub async fn reject(mut socket: WebSocket) {
        let close = WsMessage::Close(Some(CloseFrame {
            code: CLOSE_INTERNAL_ERROR,
            reason: "snapshot unavailable".into(),
        }));
        if let Err(err) = socket.send(close).await {
            tracing::debug!(error = %err, "failed to send close frame");
        }
    }

    pub async fn run(self) {
        let RegisteredConnection {
            id,
            mut outbound,
            closed,
        } = self.connection;
        let registry = self.state.registry().clone();
        let (mut sender, mut incoming) = self.socket.split();

        tracing::info!(connection_id = %id, "realtime connection opened");

        let mut send_task = tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                let message = match frame {
                    OutboundFrame::Text(text) => WsMessage::Text(text.as_ref().into()),
                    OutboundFrame::Ping => WsMessage::Ping(Bytes::new()),
                };
                if sender.send(message).await.is_err() {
                    tracing::debug!(connection_id = %id, "socket write failed");
                    return;
                }
            }
            // 队列关闭说明连接已被淘汰
            if sender.send(WsMessage::Close(None)).await.is_err() {
                tracing::debug!(connection_id = %id, "failed to send close frame");
            }
        });

        let mut recv_task = {
            let registry = registry.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    match message {
                        WsMessage::Pong(_) => registry.mark_alive(id),
                        WsMessage::Close(_) => break,
                        // ping 由底层协议栈自动回复 pong
                        WsMessage::Ping(_) => {}
                        WsMessage::Text(_) | WsMessage::Binary(_) => {
                            tracing::debug!(connection_id = %id, "ignoring client message");
                        }
                    }
                }
            })
        };

        let evicted = tokio::select! {
            _ = &mut send_task => false,
            _ = &mut recv_task => false,
            _ = closed.cancelled() => true,
        };
        // 淘汰时队列已关闭，写任务排空后会发出 Close 帧；半开连接写不动则放弃
        if evicted && tokio::time::timeout(CLOSE_GRACE, &mut send_task).await.is_err() {
            tracing::debug!(connection_id = %id, "close frame not flushed before grace period");
        }
        send_task.abort();
        recv_task.abort();

        registry.evict(id);
        tracing::info!(connection_id = %id, remaining = registry.len(), "realtime connection closed");
    }
}
