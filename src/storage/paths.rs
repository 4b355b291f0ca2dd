// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the data directory layout.

use std::path::{Path, PathBuf};

/// Default data directory when `DATA_DIR` is unset.
pub const DATA_ROOT: &str = "./data";

/// Storage path utilities for the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

/// Whether `id` is safe to use as a single path component.
///
/// Record ids are UUIDs; anything with separators or dots is refused so a
/// crafted id can never escape its directory.
pub fn is_safe_component(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Blob Paths ==========

    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// Path to the ciphertext of one content version of a file.
    pub fn blob(&self, file_id: &str, version: u32) -> PathBuf {
        self.blobs_dir().join(format!("{file_id}.v{version}.bin"))
    }

    // ========== Audit Paths ==========

    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Path to a day's audit events (`date` is `YYYY-MM-DD`).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date).join("events.jsonl")
    }

    // ========== Database ==========

    /// redb file holding the record tables.
    pub fn database_file(&self) -> PathBuf {
        self.root.join("vault.redb")
    }
}
