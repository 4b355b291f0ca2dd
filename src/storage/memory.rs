// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process record store.
//!
//! Records live in a map keyed on id, with a second map from share token to
//! id. Both maps sit behind a single `RwLock`: lookups share the read lock,
//! and every mutation holds the write lock for the whole
//! read-transform-index-write sequence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{FileStore, RecordUpdate, StoreError, StoreResult};
use crate::models::EncryptedFile;

#[derive(Default)]
struct Tables {
    files: HashMap<String, EncryptedFile>,
    by_token: HashMap<String, String>,
}

impl Tables {
    /// Point the token index at `file`'s current token, dropping `previous`.
    fn reindex(&mut self, previous: Option<&str>, file: &EncryptedFile) -> StoreResult<()> {
        if let Some(token) = file.share_token.as_deref() {
            if let Some(owner_id) = self.by_token.get(token) {
                if owner_id != &file.id {
                    return Err(StoreError::AlreadyExists(
                        "share token already in use".to_string(),
                    ));
                }
            }
        }
        if let Some(old) = previous {
            self.by_token.remove(old);
        }
        if let Some(token) = &file.share_token {
            self.by_token.insert(token.clone(), file.id.clone());
        }
        Ok(())
    }
}

/// `FileStore` adapter backed by in-process hash maps.
#[derive(Default)]
pub struct InMemoryFileStore {
    tables: RwLock<Tables>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("record store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("record store lock poisoned".to_string()))
    }
}

impl FileStore for InMemoryFileStore {
    fn insert(&self, file: &EncryptedFile) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.files.contains_key(&file.id) {
            return Err(StoreError::AlreadyExists(format!("File {}", file.id)));
        }
        tables.reindex(None, file)?;
        tables.files.insert(file.id.clone(), file.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> StoreResult<Option<EncryptedFile>> {
        Ok(self.read()?.files.get(id).cloned())
    }

    fn find_by_share_token(&self, token: &str) -> StoreResult<Option<EncryptedFile>> {
        let tables = self.read()?;
        Ok(tables
            .by_token
            .get(token)
            .and_then(|id| tables.files.get(id))
            .cloned())
    }

    fn list_by_owner(&self, owner: &str) -> StoreResult<Vec<EncryptedFile>> {
        Ok(self
            .read()?
            .files
            .values()
            .filter(|file| file.owner == owner)
            .cloned()
            .collect())
    }

    fn update(&self, id: &str, apply: &mut RecordUpdate<'_>) -> StoreResult<EncryptedFile> {
        let mut tables = self.write()?;
        let current = tables
            .files
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("File {id}")))?;
        let previous_token = current.share_token.clone();

        let updated = apply(current)?;
        if updated.id != id {
            return Err(StoreError::Backend("update changed the record id".to_string()));
        }

        tables.reindex(previous_token.as_deref(), &updated)?;
        tables.files.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    fn purge(&self, id: &str) -> StoreResult<EncryptedFile> {
        let mut tables = self.write()?;
        let removed = tables
            .files
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("File {id}")))?;
        if let Some(token) = &removed.share_token {
            tables.by_token.remove(token);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::contract;
    use std::sync::Arc;

    #[test]
    fn insert_get_and_list() {
        contract::insert_get_and_list(&InMemoryFileStore::new());
    }

    #[test]
    fn token_index_follows_updates() {
        contract::token_index_follows_updates(&InMemoryFileStore::new());
    }

    #[test]
    fn failed_update_leaves_record_untouched() {
        contract::failed_update_leaves_record_untouched(&InMemoryFileStore::new());
    }

    #[test]
    fn purge_removes_record_and_token() {
        contract::purge_removes_record_and_token(&InMemoryFileStore::new());
    }

    #[test]
    fn concurrent_share_changes_stay_consistent() {
        contract::concurrent_share_changes_stay_consistent(Arc::new(InMemoryFileStore::new()));
    }
}
