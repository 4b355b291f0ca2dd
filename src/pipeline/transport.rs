// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process transport: hands bundles straight to the [`Vault`].

use std::sync::Arc;

use super::{TransportError, UploadBundle, UploadTransport};
use crate::error::VaultError;
use crate::models::EncryptedFile;
use crate::storage::StoreError;
use crate::vault::Vault;

impl From<VaultError> for TransportError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Store(StoreError::Backend(msg)) => TransportError::Unavailable(msg),
            other => TransportError::Rejected(other.to_string()),
        }
    }
}

/// Stores uploads through [`Vault::persist_upload`] on the blocking pool.
///
/// The vault does not audit this path; pair the pipeline with
/// [`Vault::audit_sink`] to get the "upload" event.
#[derive(Clone)]
pub struct StoreTransport {
    vault: Arc<Vault>,
}

impl StoreTransport {
    pub fn new(vault: Arc<Vault>) -> Self {
        Self { vault }
    }
}

impl UploadTransport for StoreTransport {
    async fn transmit(&self, bundle: &UploadBundle) -> Result<EncryptedFile, TransportError> {
        let vault = self.vault.clone();
        let bundle = bundle.clone();
        tokio::task::spawn_blocking(move || vault.persist_upload(bundle.file, &bundle.ciphertext))
            .await
            .map_err(|e| TransportError::Unavailable(format!("store task failed: {e}")))?
            .map_err(TransportError::from)
    }
}
