// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! The vault persists two kinds of data:
//!
//! - **Records** ([`EncryptedFile`]) behind the [`FileStore`] port, with two
//!   adapters chosen at start-up: [`InMemoryFileStore`] and
//!   [`RedbFileStore`].
//! - **Ciphertext blobs** and **audit logs** as plain files under the data
//!   directory.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   vault.redb              # record tables (redb backend only)
//!   blobs/
//!     {file_id}.v{version}.bin  # ciphertext + GCM tag, one per content version
//!   audit/
//!     {date}/events.jsonl   # daily audit logs
//! ```
//!
//! ## Consistency
//!
//! Both adapters keep a primary table keyed on file id and a secondary index
//! keyed on share token. Every mutation goes through [`FileStore::update`],
//! which applies the change and the index maintenance under one writer
//! (a write lock, or a redb write transaction), so a reader never sees a
//! token that points at a record whose share state has already been cleared.

pub mod audit;
pub mod blobs;
pub mod memory;
pub mod paths;
pub mod redb_store;

pub use audit::{AuditEvent, AuditEventType, AuditSink, JsonlAuditLog, MemoryAuditLog};
pub use blobs::BlobStorage;
pub use memory::InMemoryFileStore;
pub use paths::StoragePaths;
pub use redb_store::RedbFileStore;

use crate::models::EncryptedFile;

/// Error type for record and blob storage.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Backing store failure (redb, filesystem, poisoned lock).
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Mutation applied to a single record inside [`FileStore::update`].
///
/// Returning an error aborts the update and leaves the record untouched.
pub type RecordUpdate<'a> = dyn FnMut(EncryptedFile) -> StoreResult<EncryptedFile> + Send + 'a;

/// Keyed record store for [`EncryptedFile`]s.
///
/// Call sites depend on `Arc<dyn FileStore>` only.
pub trait FileStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` on id collision.
    fn insert(&self, file: &EncryptedFile) -> StoreResult<()>;

    fn get(&self, id: &str) -> StoreResult<Option<EncryptedFile>>;

    /// Look up a record through the share-token index.
    ///
    /// Returns whatever the index holds; expiry and liveness are the
    /// caller's policy.
    fn find_by_share_token(&self, token: &str) -> StoreResult<Option<EncryptedFile>>;

    /// All records of `owner`, deleted ones included.
    fn list_by_owner(&self, owner: &str) -> StoreResult<Vec<EncryptedFile>>;

    /// Atomically read, transform and write back one record, keeping the
    /// share-token index in step. Fails with `NotFound` for unknown ids.
    fn update(&self, id: &str, apply: &mut RecordUpdate<'_>) -> StoreResult<EncryptedFile>;

    /// Remove a record and its index entry for good.
    fn purge(&self, id: &str) -> StoreResult<EncryptedFile>;

    fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
