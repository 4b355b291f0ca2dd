// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Models
//!
//! [`EncryptedFile`] is the persisted record. It is a plain value type:
//! every lifecycle change goes through a transition method that consumes the
//! record and returns the updated one, so a half-applied change can never be
//! observed.
//!
//! JSON field names follow the wire layout (`userId`, `encryptionKey`, `iv`,
//! ...). The Rust names describe what the fields hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Encrypted file record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedFile {
    /// Unique record identifier (UUID v4).
    pub id: String,
    /// Identifier of the owning principal.
    #[serde(rename = "userId")]
    pub owner: String,
    /// Stored name, `encrypted_<originalName>` by convention.
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    /// Plaintext length in bytes.
    #[serde(rename = "size")]
    pub plaintext_size: u64,
    /// Ciphertext length in bytes: plaintext plus the 16-byte tag.
    #[serde(rename = "encryptedSize")]
    pub ciphertext_size: u64,
    /// SHA-256 of the plaintext, hex encoded.
    pub checksum: String,
    /// Raw 256-bit key, hex encoded (64 characters).
    #[serde(rename = "encryptionKey")]
    pub key_material: String,
    /// 96-bit nonce, hex encoded (24 characters).
    #[serde(rename = "iv")]
    pub nonce: String,
    pub is_shared: bool,
    /// Present iff `is_shared`.
    pub share_token: Option<String>,
    /// Absent means the link never expires.
    pub share_expires_at: Option<DateTime<Utc>>,
    pub folder_id: Option<String>,
    /// Starts at 1, incremented on content replacement.
    pub version: u32,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated fields for a new record (everything the uploader supplies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub owner: String,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub plaintext_size: u64,
    pub ciphertext_size: u64,
    pub checksum: String,
    pub key_material: String,
    pub nonce: String,
    pub folder_id: Option<String>,
}

/// Replacement content for an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentReplacement {
    pub plaintext_size: u64,
    pub ciphertext_size: u64,
    pub checksum: String,
    pub key_material: String,
    pub nonce: String,
}

impl EncryptedFile {
    pub fn new(file: NewFile, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: file.owner,
            filename: file.filename,
            original_name: file.original_name,
            mime_type: file.mime_type,
            plaintext_size: file.plaintext_size,
            ciphertext_size: file.ciphertext_size,
            checksum: file.checksum,
            key_material: file.key_material,
            nonce: file.nonce,
            is_shared: false,
            share_token: None,
            share_expires_at: None,
            folder_id: file.folder_id,
            version: 1,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Publish under `token`, replacing any previous token.
    pub fn share(self, token: String, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            is_shared: true,
            share_token: Some(token),
            share_expires_at: expires_at,
            updated_at: now,
            ..self
        }
    }

    /// Clear all share state. Unchanged (including `updated_at`) if not shared.
    pub fn revoke(self, now: DateTime<Utc>) -> Self {
        if !self.is_shared && self.share_token.is_none() && self.share_expires_at.is_none() {
            return self;
        }
        Self {
            is_shared: false,
            share_token: None,
            share_expires_at: None,
            updated_at: now,
            ..self
        }
    }

    pub fn soft_delete(self, now: DateTime<Utc>) -> Self {
        Self {
            is_deleted: true,
            deleted_at: Some(now),
            updated_at: now,
            ..self
        }
    }

    pub fn restore(self, now: DateTime<Utc>) -> Self {
        Self {
            is_deleted: false,
            deleted_at: None,
            updated_at: now,
            ..self
        }
    }

    pub fn increment_version(self, now: DateTime<Utc>) -> Self {
        Self {
            version: self.version.saturating_add(1),
            updated_at: now,
            ..self
        }
    }

    pub fn move_to_folder(self, folder_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            folder_id,
            updated_at: now,
            ..self
        }
    }

    /// Change the display name; the stored name follows it.
    pub fn rename(self, original_name: String, now: DateTime<Utc>) -> Self {
        Self {
            filename: format!("encrypted_{original_name}"),
            original_name,
            updated_at: now,
            ..self
        }
    }

    /// Swap in new ciphertext metadata and bump the version.
    pub fn replace_content(self, content: ContentReplacement, now: DateTime<Utc>) -> Self {
        Self {
            plaintext_size: content.plaintext_size,
            ciphertext_size: content.ciphertext_size,
            checksum: content.checksum,
            key_material: content.key_material,
            nonce: content.nonce,
            ..self
        }
        .increment_version(now)
    }

    /// Whether a share link on this record resolves at `now`.
    pub fn share_is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_shared
            && self.share_token.is_some()
            && !self.is_deleted
            && self.share_expires_at.is_none_or(|expires| expires > now)
    }
}

/// Per-user storage totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_files: usize,
    /// Sum of plaintext sizes of non-deleted files.
    pub total_size: u64,
    pub deleted_files: usize,
    /// Shared and not deleted.
    pub shared_files: usize,
}

impl UserStats {
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a EncryptedFile>) -> Self {
        files.into_iter().fold(Self::default(), |mut stats, file| {
            if file.is_deleted {
                stats.deleted_files += 1;
            } else {
                stats.total_files += 1;
                stats.total_size += file.plaintext_size;
                if file.is_shared {
                    stats.shared_files += 1;
                }
            }
            stats
        })
    }
}

/// Link lifetime presets offered by the share dialog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum SharePreset {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "never")]
    Never,
}

/// Body of `POST /files/{id}/share`.
///
/// `expiresAt` takes precedence over `expiresIn`. With neither, the link
/// never expires.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<SharePreset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub share_token: String,
    pub share_url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub file: EncryptedFile,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileMessageResponse {
    pub message: String,
    pub file: EncryptedFile,
}

/// Body of `PUT /files/{id}`. An empty `folderId` moves the file to the
/// root.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::crypto::{integrity, TAG_LEN};

    pub fn new_file(owner: &str, name: &str) -> NewFile {
        NewFile {
            owner: owner.to_string(),
            filename: format!("encrypted_{name}"),
            original_name: name.to_string(),
            mime_type: "text/plain".to_string(),
            plaintext_size: 5,
            ciphertext_size: 5 + TAG_LEN as u64,
            checksum: integrity::digest_hex(b"hello"),
            key_material: "ab".repeat(32),
            nonce: "cd".repeat(12),
            folder_id: None,
        }
    }

    pub fn record(owner: &str, name: &str) -> EncryptedFile {
        EncryptedFile::new(new_file(owner, name), Utc::now())
    }
}
