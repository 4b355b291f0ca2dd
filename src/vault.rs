// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Vault Use Cases
//!
//! [`Vault`] ties the record store, the ciphertext blob files, the audit
//! sink and the share-link service together. HTTP handlers and the
//! in-process upload transport call into it; neither touches a store
//! adapter directly.
//!
//! Audit failures are logged and never fail the operation that triggered
//! them.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::crypto::{self, ciphertext_len, Key, DIGEST_LEN, NONCE_LEN};
use crate::error::VaultError;
use crate::models::{ContentReplacement, EncryptedFile, FileUpdateRequest, NewFile, UserStats};
use crate::sharing::{token_prefix, IssuedShare, Revocation, ShareLinkService, ShareTtl};
use crate::storage::{AuditEvent, AuditEventType, AuditSink, BlobStorage, FileStore, StoreError};

/// Reads of a blob that keeps being superseded give up after this many tries.
const BLOB_READ_ATTEMPTS: u32 = 3;

/// Result of a content read: the record and its ciphertext.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub file: EncryptedFile,
    pub ciphertext: Vec<u8>,
}

pub struct Vault {
    store: Arc<dyn FileStore>,
    blobs: BlobStorage,
    audit: Arc<dyn AuditSink>,
    shares: ShareLinkService,
}

impl Vault {
    pub fn new(store: Arc<dyn FileStore>, blobs: BlobStorage, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            shares: ShareLinkService::new(store.clone()),
            store,
            blobs,
            audit,
        }
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        self.audit.clone()
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event) {
            tracing::warn!(error = %e, event_type = ?event.event_type, "failed to record audit event");
        }
    }

    // =========================================================================
    // Upload
    // =========================================================================

    /// Validate and store a new record and its ciphertext without auditing.
    ///
    /// The blob is written first, so a record never exists without one.
    pub fn persist_upload(&self, new: NewFile, ciphertext: &[u8]) -> Result<EncryptedFile, VaultError> {
        let new = validate_new_file(new, ciphertext)?;
        let file = EncryptedFile::new(new, Utc::now());

        self.blobs.write(&file.id, file.version, ciphertext)?;
        if let Err(e) = self.store.insert(&file) {
            if let Err(cleanup) = self.blobs.delete(&file.id, file.version) {
                tracing::warn!(file_id = %file.id, error = %cleanup, "failed to remove orphaned blob");
            }
            return Err(e.into());
        }

        tracing::info!(
            file_id = %file.id,
            size = file.plaintext_size,
            encrypted_size = file.ciphertext_size,
            "file stored"
        );
        Ok(file)
    }

    /// `POST /files`: store the upload and emit an "upload" audit event.
    pub fn create_file(&self, new: NewFile, ciphertext: &[u8]) -> Result<EncryptedFile, VaultError> {
        let file = self.persist_upload(new, ciphertext)?;
        self.audit(upload_event(&file));
        Ok(file)
    }

    /// Swap in new ciphertext for an existing record and bump its version.
    ///
    /// The ciphertext lands in the blob of the next version while the record
    /// is locked, and the previous version's blob is removed only once the
    /// record points at the new one. A blob left behind by a failed commit is
    /// overwritten by the next replacement or removed on purge.
    pub fn replace_content(
        &self,
        id: &str,
        content: ContentReplacement,
        ciphertext: &[u8],
    ) -> Result<EncryptedFile, VaultError> {
        let content = validate_replacement(content, ciphertext)?;
        let now = Utc::now();
        let blobs = &self.blobs;

        let file = self.store.update(id, &mut |file| {
            if file.is_deleted {
                return Err(StoreError::NotFound(format!("File {id}")));
            }
            if file.key_material == content.key_material && file.nonce == content.nonce {
                return Err(StoreError::AlreadyExists("key and nonce pair".to_string()));
            }
            let next = file.replace_content(content.clone(), now);
            blobs.write(id, next.version, ciphertext)?;
            Ok(next)
        });
        let file = match file {
            Err(StoreError::AlreadyExists(_)) => {
                return Err(VaultError::validation(
                    "Replacement reuses the current key and nonce",
                ))
            }
            other => other?,
        };

        let previous = file.version - 1;
        if let Err(e) = self.blobs.delete(id, previous) {
            tracing::warn!(file_id = %id, version = previous, error = %e, "failed to delete superseded blob");
        }

        tracing::info!(file_id = %id, version = file.version, "file content replaced");
        self.audit(upload_event(&file).with_details(json!({
            "filename": file.filename,
            "size": file.plaintext_size,
            "version": file.version,
        })));
        Ok(file)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// `GET /files/{id}`: the record, audited as a download.
    pub fn get_file(&self, id: &str) -> Result<EncryptedFile, VaultError> {
        let file = self.find(id)?;
        self.audit(download_event(&file));
        Ok(file)
    }

    /// The record and its ciphertext, audited as a download.
    pub fn file_content(&self, id: &str) -> Result<FileContent, VaultError> {
        let live = || -> Result<EncryptedFile, VaultError> {
            let file = self.find(id)?;
            if file.is_deleted {
                return Err(VaultError::NotFound(format!("File {id}")));
            }
            Ok(file)
        };
        let content = self.load_blob(live()?, live)?;
        self.audit(download_event(&content.file));
        Ok(content)
    }

    /// Non-deleted files of `owner`, newest first.
    pub fn list_files(&self, owner: &str) -> Result<Vec<EncryptedFile>, VaultError> {
        self.list(owner, false)
    }

    /// Soft-deleted files of `owner`, most recently deleted first.
    pub fn list_trash(&self, owner: &str) -> Result<Vec<EncryptedFile>, VaultError> {
        let mut files = self.list(owner, true)?;
        files.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));
        Ok(files)
    }

    pub fn stats(&self, owner: &str) -> Result<UserStats, VaultError> {
        let files = self.store.list_by_owner(owner)?;
        Ok(UserStats::from_files(&files))
    }

    pub fn audit_events(&self, owner: &str, date: NaiveDate) -> Result<Vec<AuditEvent>, VaultError> {
        Ok(self.audit.events_for_user(owner, date)?)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Rename and/or move a file.
    pub fn update_metadata(
        &self,
        id: &str,
        update: FileUpdateRequest,
    ) -> Result<EncryptedFile, VaultError> {
        if update.original_name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(VaultError::validation("originalName must not be empty"));
        }
        let now = Utc::now();
        let file = self.store.update(id, &mut |file| {
            if file.is_deleted {
                return Err(StoreError::NotFound(format!("File {id}")));
            }
            let file = match update.original_name.clone() {
                Some(name) => file.rename(name, now),
                None => file,
            };
            Ok(match update.folder_id.clone() {
                Some(folder) if folder.is_empty() => file.move_to_folder(None, now),
                Some(folder) => file.move_to_folder(Some(folder), now),
                None => file,
            })
        })?;
        Ok(file)
    }

    /// Move a file to the trash. Its share link stops resolving.
    pub fn delete_file(&self, id: &str) -> Result<EncryptedFile, VaultError> {
        let now = Utc::now();
        let file = self.store.update(id, &mut |file| {
            if file.is_deleted {
                return Err(StoreError::NotFound(format!("File {id}")));
            }
            Ok(file.soft_delete(now))
        })?;

        tracing::info!(file_id = %id, "file moved to trash");
        self.audit(
            file_event(AuditEventType::Delete, &file)
                .with_details(json!({ "filename": file.filename })),
        );
        Ok(file)
    }

    /// Bring a file back from the trash.
    pub fn restore_file(&self, id: &str) -> Result<EncryptedFile, VaultError> {
        let now = Utc::now();
        let file = self.store.update(id, &mut |file| {
            if !file.is_deleted {
                return Err(StoreError::AlreadyExists(format!("File {id}")));
            }
            Ok(file.restore(now))
        });
        let file = match file {
            Err(StoreError::AlreadyExists(_)) => {
                return Err(VaultError::validation("File is not in the trash"))
            }
            other => other?,
        };

        tracing::info!(file_id = %id, "file restored");
        self.audit(
            file_event(AuditEventType::Restore, &file)
                .with_details(json!({ "filename": file.filename })),
        );
        Ok(file)
    }

    /// Hard delete: record, token index entry and blob.
    pub fn purge_file(&self, id: &str) -> Result<EncryptedFile, VaultError> {
        let file = self.store.purge(id)?;
        if let Err(e) = self.blobs.delete_all(id) {
            tracing::warn!(file_id = %id, error = %e, "failed to delete blobs of purged file");
        }

        tracing::info!(file_id = %id, "file purged");
        self.audit(
            file_event(AuditEventType::Delete, &file)
                .with_details(json!({ "filename": file.filename, "purged": true })),
        );
        Ok(file)
    }

    // =========================================================================
    // Sharing
    // =========================================================================

    pub fn share_file(&self, id: &str, ttl: ShareTtl) -> Result<IssuedShare, VaultError> {
        let issued = self.shares.issue(id, ttl, Utc::now())?;
        self.audit(file_event(AuditEventType::Share, &issued.file).with_details(json!({
            "filename": issued.file.filename,
            "tokenPrefix": token_prefix(&issued.token),
            "expiresAt": issued.expires_at,
        })));
        Ok(issued)
    }

    pub fn revoke_share(&self, id: &str) -> Result<Revocation, VaultError> {
        let revocation = self.shares.revoke(id, Utc::now())?;
        if let Some(previous) = revocation.previous_token.as_deref() {
            self.audit(
                file_event(AuditEventType::RevokeShare, &revocation.file).with_details(json!({
                    "filename": revocation.file.filename,
                    "tokenPrefix": token_prefix(previous),
                })),
            );
        }
        Ok(revocation)
    }

    /// `GET /shared/{token}`.
    pub fn resolve_shared(&self, token: &str) -> Result<EncryptedFile, VaultError> {
        self.shares.resolve(token, Utc::now())
    }

    /// Ciphertext behind a live share link, audited as a download.
    pub fn shared_content(&self, token: &str) -> Result<FileContent, VaultError> {
        let file = self.resolve_shared(token)?;
        let content = self.load_blob(file, || self.resolve_shared(token))?;
        self.audit(download_event(&content.file).with_details(json!({
            "filename": content.file.filename,
            "via": "share_link",
            "tokenPrefix": token_prefix(token),
        })));
        Ok(content)
    }

    pub fn health_check(&self) -> Result<(), StoreError> {
        self.store.health_check()?;
        self.blobs.health_check()
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn find(&self, id: &str) -> Result<EncryptedFile, VaultError> {
        self.store
            .get(id)?
            .ok_or_else(|| VaultError::NotFound(format!("File {id}")))
    }

    fn list(&self, owner: &str, deleted: bool) -> Result<Vec<EncryptedFile>, VaultError> {
        let mut files: Vec<_> = self
            .store
            .list_by_owner(owner)?
            .into_iter()
            .filter(|file| file.is_deleted == deleted)
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }

    /// Read the blob of `file`'s version. A blob that vanished because a
    /// concurrent replacement superseded it is retried against the record
    /// `refetch` returns.
    fn load_blob(
        &self,
        mut file: EncryptedFile,
        refetch: impl Fn() -> Result<EncryptedFile, VaultError>,
    ) -> Result<FileContent, VaultError> {
        let mut attempts = 1;
        let ciphertext = loop {
            match self.blobs.read(&file.id, file.version) {
                Ok(ciphertext) => break ciphertext,
                Err(StoreError::NotFound(_)) => {
                    let current = refetch()?;
                    if current.version == file.version || attempts >= BLOB_READ_ATTEMPTS {
                        return Err(VaultError::Integrity(format!(
                            "Blob of file {} is missing",
                            file.id
                        )));
                    }
                    attempts += 1;
                    file = current;
                }
                Err(e) => return Err(e.into()),
            }
        };
        if ciphertext.len() as u64 != file.ciphertext_size {
            tracing::error!(
                file_id = %file.id,
                expected = file.ciphertext_size,
                actual = ciphertext.len(),
                "stored blob does not match its record"
            );
            return Err(VaultError::Integrity(format!(
                "Blob of file {} does not match its record",
                file.id
            )));
        }
        Ok(FileContent { file, ciphertext })
    }
}

// =============================================================================
// Audit Events
// =============================================================================

fn file_event(event_type: AuditEventType, file: &EncryptedFile) -> AuditEvent {
    AuditEvent::new(event_type)
        .with_user(&file.owner)
        .with_file(&file.id)
}

/// "upload" event carrying filename and size.
pub(crate) fn upload_event(file: &EncryptedFile) -> AuditEvent {
    file_event(AuditEventType::Upload, file).with_details(json!({
        "filename": file.filename,
        "size": file.plaintext_size,
    }))
}

fn download_event(file: &EncryptedFile) -> AuditEvent {
    file_event(AuditEventType::Download, file).with_details(json!({ "filename": file.filename }))
}

// =============================================================================
// Validation
// =============================================================================

fn require(value: &str, field: &str) -> Result<(), VaultError> {
    if value.trim().is_empty() {
        return Err(VaultError::validation(format!("{field} is required")));
    }
    Ok(())
}

/// Check the hex fields and sizes shared by uploads and replacements.
/// Returns the lowercased (checksum, key, nonce).
fn validate_crypto_fields(
    plaintext_size: u64,
    ciphertext_size: u64,
    checksum: &str,
    key_material: &str,
    nonce: &str,
    ciphertext: &[u8],
) -> Result<(String, String, String), VaultError> {
    crypto::decode_hex_array::<DIGEST_LEN>(checksum, "checksum")
        .map_err(|_| VaultError::validation("checksum must be 64 hex characters"))?;
    Key::from_hex(key_material)
        .map_err(|_| VaultError::validation("encryptionKey must be 64 hex characters"))?;
    crypto::decode_hex_array::<NONCE_LEN>(nonce, "nonce")
        .map_err(|_| VaultError::validation("iv must be 24 hex characters"))?;

    let expected = ciphertext_len(plaintext_size)
        .ok_or_else(|| VaultError::validation("size out of range"))?;
    let actual = ciphertext.len() as u64;
    if ciphertext_size != actual {
        return Err(VaultError::validation(format!(
            "encryptedSize {ciphertext_size} does not match blob length {actual}"
        )));
    }
    if actual != expected {
        return Err(VaultError::validation(format!(
            "Blob length {actual} does not match size {plaintext_size} plus the authentication tag"
        )));
    }

    Ok((
        checksum.to_ascii_lowercase(),
        key_material.to_ascii_lowercase(),
        nonce.to_ascii_lowercase(),
    ))
}

fn validate_new_file(new: NewFile, ciphertext: &[u8]) -> Result<NewFile, VaultError> {
    require(&new.owner, "userId")?;
    require(&new.filename, "filename")?;
    require(&new.original_name, "originalName")?;
    require(&new.mime_type, "mimeType")?;
    let (checksum, key_material, nonce) = validate_crypto_fields(
        new.plaintext_size,
        new.ciphertext_size,
        &new.checksum,
        &new.key_material,
        &new.nonce,
        ciphertext,
    )?;
    Ok(NewFile {
        checksum,
        key_material,
        nonce,
        ..new
    })
}

fn validate_replacement(
    content: ContentReplacement,
    ciphertext: &[u8],
) -> Result<ContentReplacement, VaultError> {
    let (checksum, key_material, nonce) = validate_crypto_fields(
        content.plaintext_size,
        content.ciphertext_size,
        &content.checksum,
        &content.key_material,
        &content.nonce,
        ciphertext,
    )?;
    Ok(ContentReplacement {
        checksum,
        key_material,
        nonce,
        ..content
    })
}
