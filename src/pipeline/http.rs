// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP transport: multipart `POST /files` against a running vault server.
//!
//! The server audits the upload itself, so pipelines using this transport
//! should not be given an audit sink.

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{TransportError, UploadBundle, UploadTransport};
use crate::models::EncryptedFile;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn form(bundle: &UploadBundle) -> Result<Form, TransportError> {
        let file = &bundle.file;
        let blob = Part::bytes(bundle.ciphertext.to_vec())
            .file_name(file.filename.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        let mut form = Form::new()
            .text("userId", file.owner.clone())
            .text("filename", file.filename.clone())
            .text("originalName", file.original_name.clone())
            .text("mimeType", file.mime_type.clone())
            .text("size", file.plaintext_size.to_string())
            .text("checksum", file.checksum.clone())
            .text("encryptionKey", file.key_material.clone())
            .text("iv", file.nonce.clone());
        if let Some(folder) = &file.folder_id {
            form = form.text("folderId", folder.clone());
        }
        Ok(form.part("file", blob))
    }
}

impl UploadTransport for HttpTransport {
    async fn transmit(&self, bundle: &UploadBundle) -> Result<EncryptedFile, TransportError> {
        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .multipart(Self::form(bundle)?)
            .send()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<EncryptedFile>()
                .await
                .map_err(|e| TransportError::Rejected(format!("invalid response body: {e}")));
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(TransportError::Unavailable(message))
        } else {
            Err(TransportError::Rejected(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let transport = HttpTransport::new("http://127.0.0.1:8080/");
        assert_eq!(transport.base_url, "http://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn unreachable_server_is_retryable() {
        // Bind and drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = HttpTransport::new(format!("http://127.0.0.1:{port}"));
        let bundle = crate::pipeline::encrypt_request(crate::pipeline::UploadRequest::new(
            "alice",
            "a.txt",
            b"abc".to_vec(),
        ))
        .unwrap();

        let err = transport.transmit(&bundle).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
