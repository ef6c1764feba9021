//! 文件便签存储
//!
//! 以 JSON Lines 追加写入，每行一条便签。打开时重放全部行重建内存索引，
//! 写入成功并落盘后便签才对查询可见。
//!
//! 追加在独立任务中完成，调用方被取消也不会留下“已落盘但未入索引”的行；
//! 写入失败时把文件截回写入前的长度。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use application::Clock;
use async_trait::async_trait;
use domain::{InsertOutcome, NewNote, Note, NoteRepository, RepositoryError, RepositoryResult};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::memory::NoteIndex;

fn io_err(path: &Path, err: std::io::Error) -> RepositoryError {
    RepositoryError::storage(format!("{}: {}", path.display(), err))
}

struct FileState {
    index: NoteIndex,
    file: File,
}

pub struct FileNoteRepository {
    path: Arc<PathBuf>,
    state: Arc<Mutex<FileState>>,
    clock: Arc<dyn Clock>,
}

impl FileNoteRepository {
    /// 打开（或创建）日志文件并重放已有便签
    pub async fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> RepositoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| io_err(parent, err))?;
        }

        let index = Self::replay(&path).await?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| io_err(&path, err))?;

        info!(path = %path.display(), notes = index.len(), "file note store opened");
        Ok(Self {
            path: Arc::new(path),
            state: Arc::new(Mutex::new(FileState { index, file })),
            clock,
        })
    }

    async fn replay(path: &Path) -> RepositoryResult<NoteIndex> {
        let mut index = NoteIndex::default();
        let file = match File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(index),
            Err(err) => return Err(io_err(path, err)),
        };

        let mut lines = BufReader::new(file).lines();
        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await.map_err(|err| io_err(path, err))? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let note: Note = serde_json::from_str(&line).map_err(|err| {
                RepositoryError::corrupt(format!("{}:{}: {}", path.display(), line_no, err))
            })?;
            if index.contains(&note.signature) {
                warn!(line = line_no, signature = %note.signature, "duplicate signature in note log ignored");
                continue;
            }
            index.push(note);
        }
        Ok(index)
    }

    async fn append(
        state: &Mutex<FileState>,
        path: &Path,
        clock: &dyn Clock,
        note: NewNote,
    ) -> RepositoryResult<InsertOutcome> {
        let mut state = state.lock().await;
        if state.index.contains(&note.signature) {
            return Ok(InsertOutcome::AlreadyExists);
        }

        let stored = note.stamp(state.index.next_timestamp(clock.now()));
        let mut line = serde_json::to_string(&stored)
            .map_err(|err| RepositoryError::storage(err.to_string()))?;
        line.push('\n');

        let committed_len = state
            .file
            .metadata()
            .await
            .map_err(|err| io_err(path, err))?
            .len();

        if let Err(err) = Self::write_line(&mut state.file, line.as_bytes()).await {
            // 丢弃写了一半的行，保持日志与索引一致
            if let Err(truncate_err) = state.file.set_len(committed_len).await {
                warn!(
                    path = %path.display(),
                    error = %truncate_err,
                    "failed to roll back partial note write"
                );
            }
            return Err(io_err(path, err));
        }

        state.index.push(stored.clone());
        Ok(InsertOutcome::Inserted(stored))
    }

    async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
        file.write_all(line).await?;
        file.flush().await?;
        file.sync_data().await
    }
}

#[async_trait]
impl NoteRepository for FileNoteRepository {
    async fn insert_if_absent(&self, note: NewNote) -> RepositoryResult<InsertOutcome> {
        let state = self.state.clone();
        let path = self.path.clone();
        let clock = self.clock.clone();

        tokio::spawn(async move { Self::append(&state, &path, clock.as_ref(), note).await })
            .await
            .map_err(|err| RepositoryError::storage(format!("note append task failed: {err}")))?
    }

    async fn list_recent(&self, limit: u32) -> RepositoryResult<Vec<Note>> {
        Ok(self.state.lock().await.index.recent(limit))
    }
}
