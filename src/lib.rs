// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vaultlink - Encrypted File Vault with Revocable Share Links
//!
//! Files are encrypted on the client (AES-256-GCM, per-file keys) before
//! they reach the server, which stores the ciphertext and its metadata and
//! mints time-limited share tokens.
//!
//! ## Modules
//!
//! - `crypto` - KeyManager, CipherEngine, IntegrityVerifier
//! - `pipeline` - per-file upload state machine and its transports
//! - `sharing` - share token issue/resolve/revoke
//! - `vault` - use cases over records, blobs and audit
//! - `storage` - record store adapters (memory, redb), blobs, audit logs
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod sharing;
pub mod state;
pub mod storage;
pub mod vault;

use config::LogFormat;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_logging(format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
