// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ciphertext blob files.
//!
//! Blobs are already encrypted by the uploader; this module only moves bytes.
//! Each content version of a record gets its own file, so replacing content
//! never touches the blob the committed record still points at. Writes go to
//! a temp file first and are renamed into place, so a reader sees either no
//! blob or the whole one, never a partial write.

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use super::paths::is_safe_component;
use super::{StoragePaths, StoreError, StoreResult};

/// Filesystem store for ciphertext blobs, keyed by record id and version.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    paths: StoragePaths,
}

impl BlobStorage {
    /// Create the blob directory (idempotent) and return the store.
    pub fn open(paths: StoragePaths) -> StoreResult<Self> {
        fs::create_dir_all(paths.blobs_dir())?;
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    fn checked(&self, file_id: &str, version: u32) -> StoreResult<PathBuf> {
        if is_safe_component(file_id) {
            Ok(self.paths.blob(file_id, version))
        } else {
            Err(StoreError::NotFound(format!("Blob {file_id}")))
        }
    }

    /// Write (or replace) the blob for `file_id` at `version` atomically.
    pub fn write(&self, file_id: &str, version: u32, data: &[u8]) -> StoreResult<()> {
        let path = self.checked(file_id, version)?;
        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    pub fn read(&self, file_id: &str, version: u32) -> StoreResult<Vec<u8>> {
        let path = self.checked(file_id, version)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                StoreError::NotFound(format!("Blob {file_id} v{version}"))
            }
            _ => StoreError::from(e),
        })
    }

    /// Delete one version. Missing blobs are not an error.
    pub fn delete(&self, file_id: &str, version: u32) -> StoreResult<()> {
        let path = self.checked(file_id, version)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every version of `file_id`, including leftovers of failed
    /// replacements.
    pub fn delete_all(&self, file_id: &str) -> StoreResult<()> {
        if !is_safe_component(file_id) {
            return Err(StoreError::NotFound(format!("Blob {file_id}")));
        }
        // Ids never contain dots, so the prefix matches this record only.
        let prefix = format!("{file_id}.v");
        for entry in fs::read_dir(self.paths.blobs_dir())? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_str().is_some_and(|n| n.starts_with(&prefix)) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    pub fn exists(&self, file_id: &str, version: u32) -> bool {
        self.checked(file_id, version)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Write-read-delete probe of the blob directory.
    pub fn health_check(&self) -> StoreResult<()> {
        let probe = self.paths.blobs_dir().join(".health_check");
        let data = b"health_check_data";

        fs::write(&probe, data)?;
        let read_back = fs::read(&probe)?;
        fs::remove_file(&probe)?;

        if read_back != data {
            return Err(StoreError::Backend(
                "Health check data mismatch".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BlobStorage) {
        let temp = TempDir::new().unwrap();
        let blobs = BlobStorage::open(StoragePaths::new(temp.path())).unwrap();
        (temp, blobs)
    }

    #[test]
    fn write_read_and_replace() {
        let (_temp, blobs) = setup();
        blobs.write("file-1", 1, b"\x00\x01ciphertext").unwrap();
        assert_eq!(blobs.read("file-1", 1).unwrap(), b"\x00\x01ciphertext");

        blobs.write("file-1", 1, b"replacement").unwrap();
        assert_eq!(blobs.read("file-1", 1).unwrap(), b"replacement");
        assert!(!blobs.paths().blobs_dir().join("file-1.v1.tmp").exists());
    }

    #[test]
    fn versions_are_independent() {
        let (_temp, blobs) = setup();
        blobs.write("file-1", 1, b"first").unwrap();
        blobs.write("file-1", 2, b"second").unwrap();
        assert_eq!(blobs.read("file-1", 1).unwrap(), b"first");
        assert_eq!(blobs.read("file-1", 2).unwrap(), b"second");

        blobs.delete("file-1", 1).unwrap();
        assert!(!blobs.exists("file-1", 1));
        assert!(blobs.exists("file-1", 2));
    }

    #[test]
    fn missing_blob_is_not_found() {
        let (_temp, blobs) = setup();
        assert!(matches!(blobs.read("nope", 1), Err(StoreError::NotFound(_))));
        assert!(!blobs.exists("nope", 1));
    }

    #[test]
    fn delete_is_idempotent() {
        let (_temp, blobs) = setup();
        blobs.write("file-2", 1, b"x").unwrap();
        assert!(blobs.exists("file-2", 1));
        blobs.delete("file-2", 1).unwrap();
        blobs.delete("file-2", 1).unwrap();
        assert!(!blobs.exists("file-2", 1));
    }

    #[test]
    fn delete_all_spares_other_records() {
        let (_temp, blobs) = setup();
        blobs.write("file-3", 1, b"a").unwrap();
        blobs.write("file-3", 4, b"b").unwrap();
        blobs.write("file-30", 1, b"c").unwrap();

        blobs.delete_all("file-3").unwrap();
        assert!(!blobs.exists("file-3", 1));
        assert!(!blobs.exists("file-3", 4));
        assert!(blobs.exists("file-30", 1));
    }

    #[test]
    fn unsafe_ids_never_touch_the_filesystem() {
        let (_temp, blobs) = setup();
        assert!(matches!(
            blobs.write("../escape", 1, b"x"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            blobs.delete_all("../escape"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn health_check_works() {
        let (_temp, blobs) = setup();
        blobs.health_check().expect("Health check should pass");
    }
}
