use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    InsertOutcome, NewNote, Note, NoteColor, NoteMessage, NoteRepository, RepositoryError,
    RepositoryResult, Signature, WalletAddress,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::corrupt(message)
}

#[derive(Debug, FromRow)]
struct NoteRecord {
    message: String,
    signature: String,
    wallet_address: String,
    color: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<NoteRecord> for Note {
    type Error = RepositoryError;

    fn try_from(value: NoteRecord) -> Result<Self, Self::Error> {
        Ok(Note {
            message: NoteMessage::parse(value.message).map_err(|err| invalid_data(err.to_string()))?,
            signature: Signature::parse(value.signature)
                .map_err(|err| invalid_data(err.to_string()))?,
            wallet_address: WalletAddress::parse(value.wallet_address)
                .map_err(|err| invalid_data(err.to_string()))?,
            color: value
                .color
                .parse::<NoteColor>()
                .map_err(|err| invalid_data(err.to_string()))?,
            timestamp: value.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgNoteRepository {
    pool: PgPool,
}

impl PgNoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn insert_if_absent(&self, note: NewNote) -> RepositoryResult<InsertOutcome> {
        // 唯一约束保证并发插入同一签名时只有一行返回
        let record = sqlx::query_as::<_, NoteRecord>(
            r#"
            INSERT INTO sticky_notes (message, signature, wallet_address, color)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (signature) DO NOTHING
            RETURNING message, signature, wallet_address, color, created_at
            "#,
        )
        .bind(note.message.as_str())
        .bind(note.signature.as_str())
        .bind(note.wallet_address.as_str())
        .bind(note.color.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        match record {
            Some(record) => Ok(InsertOutcome::Inserted(Note::try_from(record)?)),
            None => Ok(InsertOutcome::AlreadyExists),
        }
    }

    async fn list_recent(&self, limit: u32) -> RepositoryResult<Vec<Note>> {
        let records = sqlx::query_as::<_, NoteRecord>(
            r#"SELECT message, signature, wallet_address, color, created_at
            FROM sticky_notes
            ORDER BY created_at DESC, id DESC
            LIMIT $1"#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(Note::try_from).collect()
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}
