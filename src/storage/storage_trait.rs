//! Storage Trait
//!
//! This module defines the `RecordStorage` trait, the interface handed to the
//! persistence collaborator of a capture session.
//!
//! Implementors of this trait are responsible for:
//! - Persisting the decoded records of a completed session
//! - Retrieving and listing stored captures
//! - Cleaning up old captures

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::types::StoredCapture;

pub trait RecordStorage: Send + Sync {
    /// Saves the capture of one session, replacing any earlier copy.
    fn save_capture(&self, capture: &StoredCapture) -> Result<(), StorageError>;

    fn get_capture(&self, session_id: Uuid) -> Result<StoredCapture, StorageError>;

    /// All stored captures, oldest first.
    fn list_captures(&self) -> Result<Vec<StoredCapture>, StorageError>;

    /// Removes captures that finished before `older_than`; returns how many.
    fn cleanup_older_than(&self, older_than: DateTime<Utc>) -> Result<usize, StorageError>;
}
