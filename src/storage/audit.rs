// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive vault operations.
//!
//! Uploads, downloads, share changes and deletions are recorded per owner.
//! Events never carry key material, nonces or full share tokens.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{StoragePaths, StoreError, StoreResult};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Upload,
    Download,
    Share,
    RevokeShare,
    Delete,
    Restore,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Owner of the affected file.
    pub user_id: Option<String>,
    /// Resource type (always `file` today).
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: None,
            resource_type: None,
            resource_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    /// Override the timestamp (simulated clocks).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the affected file.
    pub fn with_file(mut self, file_id: impl Into<String>) -> Self {
        self.resource_type = Some("file".to_string());
        self.resource_id = Some(file_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> StoreResult<()>;

    /// Events of `user_id` that happened on `date` (UTC), oldest first.
    fn events_for_user(&self, user_id: &str, date: NaiveDate) -> StoreResult<Vec<AuditEvent>>;
}

/// Daily JSONL files under `{DATA_DIR}/audit/{date}/events.jsonl`.
pub struct JsonlAuditLog {
    paths: StoragePaths,
    // Serializes appends so lines from concurrent writers never interleave.
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            write_lock: Mutex::new(()),
        }
    }

    fn read_day(&self, date: NaiveDate) -> StoreResult<Vec<AuditEvent>> {
        let path = self
            .paths
            .audit_events_file(&date.format("%Y-%m-%d").to_string());
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut events = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, event: &AuditEvent) -> StoreResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.paths.audit_events_file(&date);

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().map_err(StoreError::backend)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;
        Ok(())
    }

    fn events_for_user(&self, user_id: &str, date: NaiveDate) -> StoreResult<Vec<AuditEvent>> {
        Ok(self
            .read_day(date)?
            .into_iter()
            .filter(|e| e.user_id.as_deref() == Some(user_id))
            .collect())
    }
}

/// In-memory sink for tests and the memory backend.
#[derive(Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn all(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, event: &AuditEvent) -> StoreResult<()> {
        self.events
            .lock()
            .map_err(StoreError::backend)?
            .push(event.clone());
        Ok(())
    }

    fn events_for_user(&self, user_id: &str, date: NaiveDate) -> StoreResult<Vec<AuditEvent>> {
        let events = self.events.lock().map_err(StoreError::backend)?;
        Ok(events
            .iter()
            .filter(|e| e.user_id.as_deref() == Some(user_id) && e.timestamp.date_naive() == date)
            .cloned()
            .collect())
    }
}
