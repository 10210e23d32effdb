//! Storage subsystem
//!
//! Persistence collaborator for completed capture sessions.
//!
//! Components:
//! - `storage_trait`: the RecordStorage trait defining a uniform API.
//! - `types`: the persisted form of a session.
//! - `file_storage`: filesystem-backed JSON implementation.
//! - `storage_observer`: session observer that persists every completed session.

pub mod file_storage;
pub mod storage_observer;
pub mod storage_trait;
pub mod types;

pub use file_storage::FileStorage;
pub use storage_observer::StorageObserver;
pub use storage_trait::RecordStorage;
pub use types::StoredCapture;
