// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Upload Pipeline
//!
//! Each file runs as its own task through
//!
//! ```text
//! Queued -> Encrypting -> Uploading -> Complete
//!    \          \             \
//!     +----------+-------------+----> Failed
//! ```
//!
//! - **Encrypting**: obtain a key (random or PBKDF2 from a password), digest
//!   the plaintext, then seal it with AES-256-GCM. This runs on the blocking
//!   pool so it never stalls tasks doing network I/O.
//! - **Uploading**: hand the bundle to an [`UploadTransport`], retrying
//!   transient store failures per [`RetryPolicy`].
//! - **Complete**: the store acknowledged the record. An "upload" audit
//!   event is emitted when the pipeline has an audit sink.
//!
//! Progress is published on a `watch` channel at coarse milestones (0, 25,
//! 75, 100); consumers must tolerate jumps. A `CancellationToken` is checked
//! at the Encrypting and Uploading boundaries and raced against the
//! transport call. One file failing never affects its siblings.

use std::future::Future;
use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::crypto::{integrity, CipherEngine, CryptoError, KeyManager};
use crate::models::{EncryptedFile, NewFile};
use crate::storage::{AuditEvent, AuditEventType, AuditSink};

pub mod http;
pub mod retry;
pub mod transport;

pub use http::HttpTransport;
pub use retry::{RetryDecision, RetryPolicy};
pub use transport::StoreTransport;

/// Per-file upload state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Queued,
    Encrypting,
    Uploading,
    Complete,
    Failed,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadState::Complete | UploadState::Failed)
    }

    /// Progress milestone reached on entering this state. `None` for Failed,
    /// which keeps whatever was reached before.
    fn milestone(self) -> Option<u8> {
        match self {
            UploadState::Queued => Some(0),
            UploadState::Encrypting => Some(25),
            UploadState::Uploading => Some(75),
            UploadState::Complete => Some(100),
            UploadState::Failed => None,
        }
    }
}

/// Snapshot published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    pub state: UploadState,
    pub percent: u8,
    /// Human-readable reason, set only in `Failed`.
    pub error: Option<String>,
}

impl UploadProgress {
    fn queued() -> Self {
        Self {
            state: UploadState::Queued,
            percent: 0,
            error: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The store refused the record (validation, missing parent). Permanent.
    #[error("rejected by record store: {0}")]
    Rejected(String),

    /// The store could not be reached or failed internally. Transient.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] TransportError),

    #[error("upload cancelled")]
    Cancelled,

    #[error("upload task failed: {0}")]
    Task(String),
}

/// Where the file key comes from.
pub enum KeySource {
    Random,
    /// PBKDF2 over the password with a fresh random salt.
    Password(SecretString),
}

/// One file to upload.
pub struct UploadRequest {
    pub owner: String,
    pub original_name: String,
    pub mime_type: String,
    pub folder_id: Option<String>,
    pub data: Vec<u8>,
    pub key_source: KeySource,
}

impl UploadRequest {
    pub fn new(owner: impl Into<String>, original_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            owner: owner.into(),
            original_name: original_name.into(),
            mime_type: "application/octet-stream".to_string(),
            folder_id: None,
            data,
            key_source: KeySource::Random,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn in_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }

    pub fn with_password(mut self, password: SecretString) -> Self {
        self.key_source = KeySource::Password(password);
        self
    }
}

/// Everything the record store needs: metadata (including the exported key,
/// nonce and plaintext digest) and the ciphertext.
#[derive(Debug, Clone)]
pub struct UploadBundle {
    pub file: NewFile,
    pub ciphertext: Arc<[u8]>,
}

/// Delivers an encrypted bundle to the record store.
pub trait UploadTransport: Send + Sync + 'static {
    fn transmit(
        &self,
        bundle: &UploadBundle,
    ) -> impl Future<Output = Result<EncryptedFile, TransportError>> + Send;
}

/// Key, digest and seal one request. CPU-bound; run on the blocking pool.
pub fn encrypt_request(request: UploadRequest) -> Result<UploadBundle, CryptoError> {
    let keys = KeyManager::new();
    let key = match &request.key_source {
        KeySource::Random => keys.generate_key()?,
        KeySource::Password(password) => {
            let salt = keys.generate_salt()?;
            keys.derive_key_from_password(password, &salt)
        }
    };

    // Digest before encryption, over the plaintext only.
    let checksum = integrity::digest_hex(&request.data);
    let sealed = CipherEngine::new().encrypt(&request.data, &key)?;
    let raw_key = Zeroizing::new(keys.export_key(&key));

    let file = NewFile {
        owner: request.owner,
        filename: format!("encrypted_{}", request.original_name),
        original_name: request.original_name,
        mime_type: request.mime_type,
        plaintext_size: request.data.len() as u64,
        ciphertext_size: sealed.ciphertext.len() as u64,
        checksum,
        key_material: hex::encode(raw_key.as_slice()),
        nonce: hex::encode(sealed.nonce),
        folder_id: request.folder_id,
    };
    Ok(UploadBundle {
        file,
        ciphertext: sealed.ciphertext.into(),
    })
}

/// Handle to one in-flight upload.
pub struct UploadHandle {
    progress: watch::Receiver<UploadProgress>,
    cancel: CancellationToken,
    task: JoinHandle<Result<EncryptedFile, UploadError>>,
}

impl UploadHandle {
    /// Receiver for progress snapshots.
    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.clone()
    }

    /// Request cancellation. Takes effect at the next boundary, or aborts a
    /// transport call in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal state.
    pub async fn wait(self) -> Result<EncryptedFile, UploadError> {
        self.task
            .await
            .map_err(|e| UploadError::Task(e.to_string()))?
    }
}

/// Runs uploads as independent tasks against one transport.
pub struct UploadPipeline<T> {
    transport: Arc<T>,
    retry: RetryPolicy,
    audit: Option<Arc<dyn AuditSink>>,
}

impl<T> Clone for UploadPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            retry: self.retry.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<T: UploadTransport> UploadPipeline<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            retry: RetryPolicy::default(),
            audit: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Emit upload audit events from the pipeline. Leave unset when the
    /// receiving server audits uploads itself.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn submit(&self, request: UploadRequest) -> UploadHandle {
        self.submit_with_cancel(request, CancellationToken::new())
    }

    pub fn submit_with_cancel(&self, request: UploadRequest, cancel: CancellationToken) -> UploadHandle {
        let (tx, rx) = watch::channel(UploadProgress::queued());
        let pipeline = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { pipeline.run(request, token, tx).await });
        UploadHandle {
            progress: rx,
            cancel,
            task,
        }
    }

    /// Submit every request; each gets its own task and handle.
    pub fn submit_all(&self, requests: impl IntoIterator<Item = UploadRequest>) -> Vec<UploadHandle> {
        requests.into_iter().map(|r| self.submit(r)).collect()
    }

    async fn run(
        self,
        request: UploadRequest,
        cancel: CancellationToken,
        progress: watch::Sender<UploadProgress>,
    ) -> Result<EncryptedFile, UploadError> {
        let owner = request.owner.clone();
        let name = request.original_name.clone();

        let result = self.drive(request, &cancel, &progress).await;
        match &result {
            Ok(file) => {
                advance(&progress, UploadState::Complete);
                tracing::info!(file_id = %file.id, size = file.plaintext_size, "upload complete");
                self.record_audit(
                    AuditEvent::new(AuditEventType::Upload)
                        .with_user(&file.owner)
                        .with_file(&file.id)
                        .with_details(serde_json::json!({
                            "filename": file.filename,
                            "size": file.plaintext_size,
                        })),
                );
            }
            Err(e) => {
                let message = e.to_string();
                progress.send_modify(|p| {
                    p.state = UploadState::Failed;
                    p.error = Some(message.clone());
                });
                tracing::warn!(file = %name, error = %message, "upload failed");
                self.record_audit(
                    AuditEvent::new(AuditEventType::Upload)
                        .with_user(owner)
                        .with_details(serde_json::json!({ "filename": format!("encrypted_{name}") }))
                        .failed(message),
                );
            }
        }
        result
    }

    async fn drive(
        &self,
        request: UploadRequest,
        cancel: &CancellationToken,
        progress: &watch::Sender<UploadProgress>,
    ) -> Result<EncryptedFile, UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        advance(progress, UploadState::Encrypting);
        let bundle = tokio::task::spawn_blocking(move || encrypt_request(request))
            .await
            .map_err(|e| UploadError::Task(e.to_string()))??;

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        advance(progress, UploadState::Uploading);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = self.transmit_with_retry(&bundle) => result.map_err(UploadError::from),
        }
    }

    async fn transmit_with_retry(&self, bundle: &UploadBundle) -> Result<EncryptedFile, TransportError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.transport.transmit(bundle).await {
                Ok(file) => return Ok(file),
                Err(err) => err,
            };
            match self.retry.decide(&err, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(attempt, error = %err, "transmit failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp | RetryDecision::Exhausted => return Err(err),
            }
        }
    }

    fn record_audit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.record(&event) {
                tracing::warn!(error = %e, "failed to record upload audit event");
            }
        }
    }
}

fn advance(progress: &watch::Sender<UploadProgress>, state: UploadState) {
    progress.send_modify(|p| {
        p.state = state;
        if let Some(percent) = state.milestone() {
            p.percent = percent;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::open_and_verify;
    use crate::storage::MemoryAuditLog;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Accepts everything, echoing the bundle back as a record.
    #[derive(Default)]
    struct EchoTransport {
        calls: AtomicU32,
    }

    impl UploadTransport for EchoTransport {
        async fn transmit(&self, bundle: &UploadBundle) -> Result<EncryptedFile, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EncryptedFile::new(bundle.file.clone(), chrono::Utc::now()))
        }
    }

    /// Fails with `Unavailable` a fixed number of times, then succeeds.
    struct FlakyTransport {
        failures: u32,
        calls: AtomicU32,
    }

    impl UploadTransport for FlakyTransport {
        async fn transmit(&self, bundle: &UploadBundle) -> Result<EncryptedFile, TransportError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(TransportError::Unavailable("disk busy".into()));
            }
            Ok(EncryptedFile::new(bundle.file.clone(), chrono::Utc::now()))
        }
    }

    struct RejectingTransport {
        calls: AtomicU32,
    }

    impl UploadTransport for RejectingTransport {
        async fn transmit(&self, _bundle: &UploadBundle) -> Result<EncryptedFile, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Rejected("checksum must be 64 hex characters".into()))
        }
    }

    /// Blocks until released, so tests can cancel mid-transmit.
    #[derive(Default)]
    struct StallingTransport {
        entered: Notify,
    }

    impl UploadTransport for StallingTransport {
        async fn transmit(&self, _bundle: &UploadBundle) -> Result<EncryptedFile, TransportError> {
            self.entered.notify_one();
            std::future::pending().await
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn encrypt_request_produces_verifiable_bundle() {
        let data = b"quarterly numbers".to_vec();
        let request = UploadRequest::new("alice", "q3.csv", data.clone())
            .with_mime_type("text/csv")
            .in_folder("reports");
        let bundle = encrypt_request(request).unwrap();

        assert_eq!(bundle.file.filename, "encrypted_q3.csv");
        assert_eq!(bundle.file.mime_type, "text/csv");
        assert_eq!(bundle.file.folder_id.as_deref(), Some("reports"));
        assert_eq!(bundle.file.plaintext_size, data.len() as u64);
        assert_eq!(bundle.ciphertext.len(), data.len() + 16);
        assert_eq!(bundle.file.key_material.len(), 64);
        assert_eq!(bundle.file.nonce.len(), 24);
        assert_eq!(bundle.file.checksum, integrity::digest_hex(&data));

        let plaintext = open_and_verify(
            &bundle.ciphertext,
            &bundle.file.key_material,
            &bundle.file.nonce,
            &bundle.file.checksum,
        )
        .unwrap();
        assert_eq!(plaintext, data);
    }

    #[test]
    fn password_keys_use_fresh_salts() {
        let request = || {
            UploadRequest::new("alice", "a.txt", b"same".to_vec())
                .with_password(SecretString::from("correct horse battery staple"))
        };
        let first = encrypt_request(request()).unwrap();
        let second = encrypt_request(request()).unwrap();
        assert_ne!(first.file.key_material, second.file.key_material);
        assert_ne!(first.file.nonce, second.file.nonce);
    }

    #[tokio::test]
    async fn successful_upload_reaches_complete_and_audits() {
        let audit = Arc::new(MemoryAuditLog::new());
        let pipeline = UploadPipeline::new(EchoTransport::default()).with_audit(audit.clone());

        let handle = pipeline.submit(UploadRequest::new("alice", "a.txt", b"hello".to_vec()));
        let progress = handle.progress();
        let file = handle.wait().await.unwrap();

        assert_eq!(file.original_name, "a.txt");
        let last = progress.borrow().clone();
        assert_eq!(last.state, UploadState::Complete);
        assert!(last.state.is_terminal());
        assert_eq!(last.percent, 100);
        assert!(last.error.is_none());

        let events = audit.all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::Upload);
        assert!(events[0].success);
        assert_eq!(events[0].details.as_ref().unwrap()["size"], 5);
    }

    #[tokio::test]
    async fn empty_file_produces_tag_only_ciphertext() {
        let pipeline = UploadPipeline::new(EchoTransport::default());
        let file = pipeline
            .submit(UploadRequest::new("alice", "empty", Vec::new()))
            .wait()
            .await
            .unwrap();
        assert_eq!(file.plaintext_size, 0);
        assert_eq!(file.ciphertext_size, 16);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let pipeline = UploadPipeline::new(FlakyTransport {
            failures: 2,
            calls: AtomicU32::new(0),
        })
        .with_retry(fast_retry());

        let file = pipeline
            .submit(UploadRequest::new("alice", "a.txt", b"x".to_vec()))
            .wait()
            .await
            .unwrap();
        assert_eq!(file.owner, "alice");
        assert_eq!(pipeline.transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let pipeline = UploadPipeline::new(FlakyTransport {
            failures: 10,
            calls: AtomicU32::new(0),
        })
        .with_retry(fast_retry());

        let handle = pipeline.submit(UploadRequest::new("alice", "a.txt", b"x".to_vec()));
        let progress = handle.progress();
        let err = handle.wait().await.unwrap_err();

        assert!(matches!(err, UploadError::Store(TransportError::Unavailable(_))));
        assert_eq!(pipeline.transport.calls.load(Ordering::SeqCst), 3);
        let last = progress.borrow().clone();
        assert_eq!(last.state, UploadState::Failed);
        assert_eq!(last.percent, 75);
        assert!(last.error.unwrap().contains("disk busy"));
    }

    #[tokio::test]
    async fn rejections_fail_without_retry_and_audit_the_failure() {
        let audit = Arc::new(MemoryAuditLog::new());
        let pipeline = UploadPipeline::new(RejectingTransport {
            calls: AtomicU32::new(0),
        })
        .with_retry(fast_retry())
        .with_audit(audit.clone());

        let err = pipeline
            .submit(UploadRequest::new("alice", "a.txt", b"x".to_vec()))
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Store(TransportError::Rejected(_))));
        assert_eq!(pipeline.transport.calls.load(Ordering::SeqCst), 1);

        let events = audit.all();
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert_eq!(events[0].user_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn cancelled_before_start_never_transmits() {
        let pipeline = UploadPipeline::new(EchoTransport::default());
        let token = CancellationToken::new();
        token.cancel();

        let handle = pipeline
            .submit_with_cancel(UploadRequest::new("alice", "a.txt", b"x".to_vec()), token);
        let progress = handle.progress();
        let err = handle.wait().await.unwrap_err();

        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(err.to_string(), "upload cancelled");
        assert_eq!(pipeline.transport.calls.load(Ordering::SeqCst), 0);
        let last = progress.borrow().clone();
        assert_eq!(last.state, UploadState::Failed);
        assert_eq!(last.percent, 0);
        assert_eq!(last.error.as_deref(), Some("upload cancelled"));
    }

    #[tokio::test]
    async fn cancel_aborts_transmit_in_flight() {
        let pipeline = UploadPipeline::new(StallingTransport::default());
        let handle = pipeline.submit(UploadRequest::new("alice", "a.txt", b"x".to_vec()));

        pipeline.transport.entered.notified().await;
        handle.cancel();
        let err = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("cancellation completes")
            .unwrap_err();
        assert!(matches!(err, UploadError::Cancelled));
    }

    #[tokio::test]
    async fn one_failure_does_not_affect_siblings() {
        let pipeline = UploadPipeline::new(EchoTransport::default());
        let cancelled = CancellationToken::new();
        cancelled.cancel();

        let ok_a = pipeline.submit(UploadRequest::new("alice", "a", b"a".to_vec()));
        let failed =
            pipeline.submit_with_cancel(UploadRequest::new("alice", "b", b"b".to_vec()), cancelled);
        let ok_c = pipeline.submit(UploadRequest::new("alice", "c", b"c".to_vec()));

        assert!(failed.wait().await.is_err());
        assert_eq!(ok_a.wait().await.unwrap().original_name, "a");
        assert_eq!(ok_c.wait().await.unwrap().original_name, "c");
    }

    #[tokio::test]
    async fn submit_all_runs_every_file() {
        let pipeline = UploadPipeline::new(EchoTransport::default());
        let handles = pipeline.submit_all(
            (0..8).map(|i| UploadRequest::new("alice", format!("f{i}"), vec![i as u8; 64])),
        );
        assert_eq!(handles.len(), 8);

        let mut names = Vec::new();
        for handle in handles {
            names.push(handle.wait().await.unwrap().original_name);
        }
        names.sort();
        assert_eq!(names.len(), 8);
        assert_eq!(pipeline.transport.calls.load(Ordering::SeqCst), 8);
    }
}
