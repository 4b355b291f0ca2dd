// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::crypto::CryptoError;
use crate::storage::StoreError;

/// Use-case level errors raised by the vault and the share-link service.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Missing or malformed request fields.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Checksum mismatch, AEAD tag failure or a blob that no longer matches
    /// its record.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Surfaced to callers as `NotFound`.
    #[error("share link expired")]
    ExpiredLink,

    #[error(transparent)]
    Store(StoreError),
}

impl VaultError {
    pub fn validation(message: impl Into<String>) -> Self {
        VaultError::Validation(message.into())
    }
}

impl From<StoreError> for VaultError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => VaultError::NotFound(what),
            other => VaultError::Store(other),
        }
    }
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Integrity | CryptoError::ChecksumMismatch => {
                VaultError::Integrity(e.to_string())
            }
            CryptoError::Randomness | CryptoError::Encryption => {
                VaultError::Store(StoreError::backend(e))
            }
            other => VaultError::Validation(other.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::Validation(message) => ApiError::bad_request(message),
            VaultError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            // Expired and unknown links are indistinguishable to callers.
            VaultError::ExpiredLink => ApiError::not_found("Share link not found"),
            VaultError::Integrity(message) => ApiError::unprocessable(message),
            VaultError::Store(err) => {
                tracing::error!(error = %err, "storage failure");
                ApiError::internal("Storage error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
