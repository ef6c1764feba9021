//! 广播中枢
//!
//! 提交流程：插入存储（按签名去重）-> 成功后序列化并扇出给所有连接。
//! 持久化与广播在同一个串行区内完成，保证先持久化成功的便签先被广播；
//! 新连接的登记与快照加载也在该串行区内，每条便签对新连接恰好出现一次。
//! 提交的串行区运行在独立任务中，请求被取消也不会出现“已持久化未广播”。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use config::SnapshotPolicy;
use domain::{InsertOutcome, NewNote, Note, NoteRepository, RepositoryResult};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::ApplicationError;
use crate::registry::{ConnectionRegistry, OutboundFrame, RegisteredConnection};

/// 快照与历史查询的最大条数
pub const SNAPSHOT_LIMIT: u32 = 1000;

/// 推送给实时连接的控制帧；新便签本身以 REST 相同的 JSON 单独推送
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RealtimeEvent<'a> {
    Initial { notes: &'a [Note] },
}

pub struct BroadcastHubDependencies {
    pub note_repository: Arc<dyn NoteRepository>,
    pub registry: Arc<ConnectionRegistry>,
}

#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    pub storage_timeout: Duration,
    pub snapshot_policy: SnapshotPolicy,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(5),
            snapshot_policy: SnapshotPolicy::Push,
        }
    }
}

pub struct BroadcastHub {
    deps: BroadcastHubDependencies,
    settings: HubSettings,
    sequencer: Arc<Mutex<()>>,
}

impl BroadcastHub {
    pub fn new(deps: BroadcastHubDependencies, settings: HubSettings) -> Self {
        Self {
            deps,
            settings,
            sequencer: Arc::new(Mutex::new(())),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.deps.registry
    }

    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        self.settings.snapshot_policy
    }

    /// 持久化并广播一条便签。签名重复时返回 `Conflict` 且不广播。
    pub async fn submit(&self, note: NewNote) -> Result<Note, ApplicationError> {
        let repository = self.deps.note_repository.clone();
        let registry = self.deps.registry.clone();
        let sequencer = self.sequencer.clone();
        let storage_timeout = self.settings.storage_timeout;

        tokio::spawn(async move {
            let _sequenced = sequencer.lock().await;
            persist_and_publish(repository.as_ref(), &registry, storage_timeout, note).await
        })
        .await?
    }

    /// 新连接的初始快照
    pub async fn initial_snapshot(&self) -> Result<Vec<Note>, ApplicationError> {
        self.list(SNAPSHOT_LIMIT).await
    }

    /// 最近的便签，按时间倒序，`limit` 限制在 1..=1000
    pub async fn list(&self, limit: u32) -> Result<Vec<Note>, ApplicationError> {
        let limit = limit.clamp(1, SNAPSHOT_LIMIT);
        bounded(
            self.settings.storage_timeout,
            self.deps.note_repository.list_recent(limit),
        )
        .await
    }

    /// 登记新连接；`push` 策略下首帧为 `initial` 快照
    pub async fn join(&self) -> Result<RegisteredConnection, ApplicationError> {
        let _sequenced = self.sequencer.lock().await;
        let connection = self.deps.registry.register();

        if self.settings.snapshot_policy == SnapshotPolicy::Push {
            if let Err(err) = self.push_snapshot(&connection).await {
                self.deps.registry.evict(connection.id);
                return Err(err);
            }
        }

        Ok(connection)
    }

    async fn push_snapshot(&self, connection: &RegisteredConnection) -> Result<(), ApplicationError> {
        let notes = self.initial_snapshot().await?;
        let payload = serde_json::to_string(&RealtimeEvent::Initial { notes: &notes })?;
        // 新建队列为空，首帧总能入队
        self.deps
            .registry
            .send_to(connection.id, OutboundFrame::text(payload));
        info!(connection_id = %connection.id, notes = notes.len(), "initial snapshot queued");
        Ok(())
    }
}

async fn persist_and_publish(
    repository: &dyn NoteRepository,
    registry: &ConnectionRegistry,
    storage_timeout: Duration,
    note: NewNote,
) -> Result<Note, ApplicationError> {
    let signature = note.signature.clone();
    let outcome = bounded(storage_timeout, repository.insert_if_absent(note)).await?;

    let stored = match outcome {
        InsertOutcome::Inserted(stored) => stored,
        InsertOutcome::AlreadyExists => {
            warn!(signature = %signature, "duplicate note signature rejected");
            return Err(ApplicationError::Conflict { signature });
        }
    };

    // 便签已持久化，序列化失败只影响广播，不回滚
    match serde_json::to_string(&stored) {
        Ok(payload) => {
            let report = registry.publish(payload.into());
            info!(
                signature = %stored.signature,
                wallet_address = %stored.wallet_address,
                delivered = report.delivered,
                dropped = report.dropped,
                "note stored and broadcast"
            );
        }
        Err(err) => {
            error!(signature = %stored.signature, error = %err, "failed to serialize stored note");
        }
    }

    Ok(stored)
}

async fn bounded<T>(
    storage_timeout: Duration,
    call: impl Future<Output = RepositoryResult<T>>,
) -> Result<T, ApplicationError> {
    match tokio::time::timeout(storage_timeout, call).await {
        Ok(result) => result.map_err(ApplicationError::from),
        Err(_) => {
            warn!(
                timeout_ms = storage_timeout.as_millis() as u64,
                "storage call timed out"
            );
            Err(ApplicationError::storage_timeout(storage_timeout))
        }
    }
}
