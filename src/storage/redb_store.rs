// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded record store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `files`: file id → serialized EncryptedFile (JSON bytes)
//! - `share_tokens`: share token → file id
//!
//! redb admits one write transaction at a time, so every
//! read-transform-index-write in [`FileStore::update`] is serialized and
//! commits both tables together.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{FileStore, RecordUpdate, StoreError, StoreResult};
use crate::models::EncryptedFile;

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: file id → serialized EncryptedFile (JSON bytes).
const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Index: share token → file id.
const SHARE_TOKENS: TableDefinition<&str, &str> = TableDefinition::new("share_tokens");

// =============================================================================
// RedbFileStore
// =============================================================================

/// `FileStore` adapter persisting records in a redb database file.
pub struct RedbFileStore {
    db: Database,
}

impl RedbFileStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(StoreError::backend)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            let _ = write_txn.open_table(FILES).map_err(StoreError::backend)?;
            let _ = write_txn
                .open_table(SHARE_TOKENS)
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        Ok(Self { db })
    }

    fn decode(bytes: &[u8]) -> StoreResult<EncryptedFile> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl FileStore for RedbFileStore {
    fn insert(&self, file: &EncryptedFile) -> StoreResult<()> {
        let json = serde_json::to_vec(file)?;

        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut files = write_txn.open_table(FILES).map_err(StoreError::backend)?;
            if files
                .get(file.id.as_str())
                .map_err(StoreError::backend)?
                .is_some()
            {
                return Err(StoreError::AlreadyExists(format!("File {}", file.id)));
            }
            files
                .insert(file.id.as_str(), json.as_slice())
                .map_err(StoreError::backend)?;

            if let Some(token) = file.share_token.as_deref() {
                let mut tokens = write_txn
                    .open_table(SHARE_TOKENS)
                    .map_err(StoreError::backend)?;
                if tokens.get(token).map_err(StoreError::backend)?.is_some() {
                    return Err(StoreError::AlreadyExists(
                        "share token already in use".to_string(),
                    ));
                }
                tokens
                    .insert(token, file.id.as_str())
                    .map_err(StoreError::backend)?;
            }
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn get(&self, id: &str) -> StoreResult<Option<EncryptedFile>> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let files = read_txn.open_table(FILES).map_err(StoreError::backend)?;
        match files.get(id).map_err(StoreError::backend)? {
            Some(value) => Ok(Some(Self::decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_by_share_token(&self, token: &str) -> StoreResult<Option<EncryptedFile>> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let tokens = read_txn
            .open_table(SHARE_TOKENS)
            .map_err(StoreError::backend)?;
        let Some(id) = tokens
            .get(token)
            .map_err(StoreError::backend)?
            .map(|guard| guard.value().to_string())
        else {
            return Ok(None);
        };

        let files = read_txn.open_table(FILES).map_err(StoreError::backend)?;
        match files.get(id.as_str()).map_err(StoreError::backend)? {
            Some(value) => Ok(Some(Self::decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn list_by_owner(&self, owner: &str) -> StoreResult<Vec<EncryptedFile>> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let files = read_txn.open_table(FILES).map_err(StoreError::backend)?;

        let mut owned = Vec::new();
        for entry in files.iter().map_err(StoreError::backend)? {
            let (_, value) = entry.map_err(StoreError::backend)?;
            let file = Self::decode(value.value())?;
            if file.owner == owner {
                owned.push(file);
            }
        }
        Ok(owned)
    }

    fn update(&self, id: &str, apply: &mut RecordUpdate<'_>) -> StoreResult<EncryptedFile> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let updated = {
            let mut files = write_txn.open_table(FILES).map_err(StoreError::backend)?;
            let current = files
                .get(id)
                .map_err(StoreError::backend)?
                .map(|guard| Self::decode(guard.value()))
                .transpose()?
                .ok_or_else(|| StoreError::NotFound(format!("File {id}")))?;
            let previous_token = current.share_token.clone();

            let updated = apply(current)?;
            if updated.id != id {
                return Err(StoreError::Backend("update changed the record id".to_string()));
            }

            let mut tokens = write_txn
                .open_table(SHARE_TOKENS)
                .map_err(StoreError::backend)?;
            if let Some(token) = updated.share_token.as_deref() {
                let holder = tokens
                    .get(token)
                    .map_err(StoreError::backend)?
                    .map(|guard| guard.value().to_string());
                if holder.is_some_and(|holder| holder != id) {
                    return Err(StoreError::AlreadyExists(
                        "share token already in use".to_string(),
                    ));
                }
            }
            if let Some(old) = previous_token.as_deref() {
                tokens.remove(old).map_err(StoreError::backend)?;
            }
            if let Some(token) = updated.share_token.as_deref() {
                tokens.insert(token, id).map_err(StoreError::backend)?;
            }

            let json = serde_json::to_vec(&updated)?;
            files
                .insert(id, json.as_slice())
                .map_err(StoreError::backend)?;
            updated
        };
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(updated)
    }

    fn purge(&self, id: &str) -> StoreResult<EncryptedFile> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let removed = {
            let mut files = write_txn.open_table(FILES).map_err(StoreError::backend)?;
            let removed = files
                .remove(id)
                .map_err(StoreError::backend)?
                .map(|guard| Self::decode(guard.value()))
                .transpose()?
                .ok_or_else(|| StoreError::NotFound(format!("File {id}")))?;

            if let Some(token) = removed.share_token.as_deref() {
                let mut tokens = write_txn
                    .open_table(SHARE_TOKENS)
                    .map_err(StoreError::backend)?;
                tokens.remove(token).map_err(StoreError::backend)?;
            }
            removed
        };
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(removed)
    }

    fn health_check(&self) -> StoreResult<()> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        read_txn.open_table(FILES).map_err(StoreError::backend)?;
        Ok(())
    }
}
