//! Local persistence for Kadai.
//!
//! The on-device half of the sync topology: per-family repositories with
//! soft-delete and needs-sync flagging, plus the checkpoint store the pull
//! phase resumes from. Two interchangeable backends — SQLite for the app,
//! in-memory for tests and device simulation.

pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod repo;
pub mod sqlite;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use error::StoreError;
pub use memory::MemoryRepo;
pub use repo::LocalRepository;
pub use sqlite::{SqliteCheckpointStore, SqliteRepo, SqliteStore};
