// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup into an [`AppConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root for blobs, audit logs and the redb file | `./data` |
//! | `STORE_BACKEND` | Record store adapter (`memory` or `redb`) | `memory` |
//! | `PUBLIC_BASE_URL` | Prefix for generated `shareUrl`s | `http://localhost:8080` |
//! | `MAX_UPLOAD_BYTES` | Multipart body limit | `104857600` (100 MiB) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use url::Url;

use crate::storage::paths::DATA_ROOT;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
///
/// Ciphertext blobs, daily audit logs and (with the redb backend) the record
/// database live here.
///
/// # Default
/// `./data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const STORE_BACKEND_ENV: &str = "STORE_BACKEND";
pub const PUBLIC_BASE_URL_ENV: &str = "PUBLIC_BASE_URL";
pub const MAX_UPLOAD_BYTES_ENV: &str = "MAX_UPLOAD_BYTES";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Which `FileStore` adapter backs the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    /// Validated absolute URL, without trailing slash.
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DATA_ROOT),
            store_backend: StoreBackend::Memory,
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let read = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());
        let invalid = |var: &'static str, value: &str| ConfigError::Invalid {
            var,
            value: value.to_string(),
        };

        let host = match read(HOST_ENV) {
            Some(v) => v.parse().map_err(|_| invalid(HOST_ENV, &v))?,
            None => defaults.host,
        };
        let port = match read(PORT_ENV) {
            Some(v) => v.parse().map_err(|_| invalid(PORT_ENV, &v))?,
            None => defaults.port,
        };
        let data_dir = read(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let store_backend = match read(STORE_BACKEND_ENV).as_deref() {
            None => defaults.store_backend,
            Some(v) if v.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            Some(v) if v.eq_ignore_ascii_case("redb") => StoreBackend::Redb,
            Some(v) => return Err(invalid(STORE_BACKEND_ENV, v)),
        };
        let public_base_url = match read(PUBLIC_BASE_URL_ENV) {
            Some(v) => {
                Url::parse(&v).map_err(|_| invalid(PUBLIC_BASE_URL_ENV, &v))?;
                v.trim_end_matches('/').to_string()
            }
            None => defaults.public_base_url,
        };
        let max_upload_bytes = match read(MAX_UPLOAD_BYTES_ENV) {
            Some(v) => v.parse().map_err(|_| invalid(MAX_UPLOAD_BYTES_ENV, &v))?,
            None => defaults.max_upload_bytes,
        };
        let log_format = match read(LOG_FORMAT_ENV).as_deref() {
            None => defaults.log_format,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Some(v) => return Err(invalid(LOG_FORMAT_ENV, v)),
        };

        Ok(Self {
            host,
            port,
            data_dir,
            store_backend,
            public_base_url,
            max_upload_bytes,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Public URL under which `token` resolves.
    pub fn share_url(&self, token: &str) -> String {
        format!("{}/shared/{token}", self.public_base_url)
    }
}
