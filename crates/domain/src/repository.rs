use async_trait::async_trait;

use crate::errors::RepositoryError;
use crate::note::{NewNote, Note};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// `insert_if_absent` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// 新便签已持久化，附带存储分配的时间戳
    Inserted(Note),
    /// 相同签名的便签已存在，本次未写入任何数据
    AlreadyExists,
}

/// 只追加的便签存储。
///
/// 实现必须自行串行化并发写入：同一签名的两次并发插入恰好一次成功。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// 以签名为唯一键插入便签
    async fn insert_if_absent(&self, note: NewNote) -> RepositoryResult<InsertOutcome>;

    /// 最近插入的至多 `limit` 条便签，按时间倒序
    async fn list_recent(&self, limit: u32) -> RepositoryResult<Vec<Note>>;
}
