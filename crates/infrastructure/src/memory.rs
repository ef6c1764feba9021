//! 内存便签存储
//!
//! 同时作为文件存储的内存索引使用。

use std::collections::HashSet;
use std::sync::Arc;

use application::Clock;
use async_trait::async_trait;
use domain::{InsertOutcome, NewNote, Note, NoteRepository, RepositoryResult, Signature, Timestamp};
use tokio::sync::RwLock;

/// 按插入顺序保存的便签与签名集合
#[derive(Debug, Default)]
pub(crate) struct NoteIndex {
    signatures: HashSet<Signature>,
    notes: Vec<Note>,
}

impl NoteIndex {
    pub(crate) fn contains(&self, signature: &Signature) -> bool {
        self.signatures.contains(signature)
    }

    /// 时间戳不早于上一条，保证插入顺序与时间顺序一致
    pub(crate) fn next_timestamp(&self, now: Timestamp) -> Timestamp {
        match self.notes.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    /// 调用方需先确认签名不存在
    pub(crate) fn push(&mut self, note: Note) {
        self.signatures.insert(note.signature.clone());
        self.notes.push(note);
    }

    pub(crate) fn recent(&self, limit: u32) -> Vec<Note> {
        self.notes
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.notes.len()
    }
}

pub struct InMemoryNoteRepository {
    index: RwLock<NoteIndex>,
    clock: Arc<dyn Clock>,
}

impl InMemoryNoteRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            index: RwLock::new(NoteIndex::default()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn insert_if_absent(&self, note: NewNote) -> RepositoryResult<InsertOutcome> {
        let mut index = self.index.write().await;
        if index.contains(&note.signature) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let stored = note.stamp(index.next_timestamp(self.clock.now()));
        index.push(stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn list_recent(&self, limit: u32) -> RepositoryResult<Vec<Note>> {
        Ok(self.index.read().await.recent(limit))
    }
}
