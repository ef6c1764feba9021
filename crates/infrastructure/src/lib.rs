//! 基础设施层实现。
//!
//! 提供便签存储的三种适配器（PostgreSQL、JSON Lines 文件、内存），实现领域层定义的存储接口。

pub mod builder;
pub mod file_store;
pub mod memory;
pub mod migrations;
pub mod repository;

pub use builder::{build_note_repository, InfrastructureError};
pub use file_store::FileNoteRepository;
pub use memory::InMemoryNoteRepository;
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgNoteRepository};
