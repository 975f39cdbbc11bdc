//! Remote store contract for Kadai.
//!
//! The authoritative half of the sync topology. [`RemoteRepository`] is
//! the seam the engine syncs against: an upsert-oriented wire protocol
//! with server-assigned `updated_at`, tombstoning deletes, and ascending
//! paginated incremental fetch. [`RemoteServer`] is the in-memory
//! reference implementation of that contract; a real HTTP backend slots
//! in behind the same trait.

pub mod error;
pub mod events;
pub mod repo;
pub mod server;

pub use error::RemoteError;
pub use events::{ChangeEvent, ChangeKind};
pub use repo::{Cursor, DEFAULT_PAGE_SIZE, PageRequest, RemoteRepository};
pub use server::RemoteServer;
