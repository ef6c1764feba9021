use domain::{DomainError, RepositoryError, Signature};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("validation error: {0}")]
    Domain(#[from] DomainError),
    #[error("note with signature {signature} already exists")]
    Conflict { signature: Signature },
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApplicationError {
    /// 存储超时按存储不可用处理
    pub fn storage_timeout(after: std::time::Duration) -> Self {
        ApplicationError::Repository(RepositoryError::storage(format!(
            "storage call timed out after {}ms",
            after.as_millis()
        )))
    }
}
