// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::config::{AppConfig, StoreBackend};
use crate::storage::{
    AuditSink, BlobStorage, FileStore, InMemoryFileStore, JsonlAuditLog, RedbFileStore,
    StoragePaths, StoreResult,
};
use crate::vault::Vault;

#[derive(Clone)]
pub struct AppState {
    pub vault: Arc<Vault>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(vault: Arc<Vault>, config: AppConfig) -> Self {
        Self {
            vault,
            config: Arc::new(config),
        }
    }

    /// Wire the vault from configuration. The store adapter is chosen here
    /// and nowhere else.
    pub fn open(config: AppConfig) -> StoreResult<Self> {
        let paths = StoragePaths::new(&config.data_dir);
        let store: Arc<dyn FileStore> = match config.store_backend {
            StoreBackend::Memory => Arc::new(InMemoryFileStore::new()),
            StoreBackend::Redb => Arc::new(RedbFileStore::open(&paths.database_file())?),
        };
        let blobs = BlobStorage::open(paths.clone())?;
        let audit: Arc<dyn AuditSink> = Arc::new(JsonlAuditLog::new(paths));

        tracing::info!(
            backend = ?config.store_backend,
            data_dir = %config.data_dir.display(),
            "vault storage opened"
        );
        Ok(Self::new(Arc::new(Vault::new(store, blobs, audit)), config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn opens_both_backends() {
        for backend in [StoreBackend::Memory, StoreBackend::Redb] {
            let temp = TempDir::new().unwrap();
            let config = AppConfig {
                data_dir: temp.path().to_path_buf(),
                store_backend: backend,
                ..AppConfig::default()
            };
            let state = AppState::open(config).unwrap();
            state.vault.health_check().unwrap();
            assert!(temp.path().join("blobs").is_dir());
            assert_eq!(
                temp.path().join("vault.redb").exists(),
                backend == StoreBackend::Redb
            );
        }
    }
}
