// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use super::run_blocking;
use crate::{
    error::ApiError,
    models::{
        ContentReplacement, EncryptedFile, FileMessageResponse, FileUpdateRequest, NewFile,
        UserStats,
    },
    state::AppState,
};

/// Multipart part carrying the ciphertext.
pub const FILE_PART: &str = "file";

/// Text fields and ciphertext collected from a multipart upload.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    fields: HashMap<String, String>,
    ciphertext: Option<Vec<u8>>,
}

impl UploadForm {
    pub(crate) async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == FILE_PART {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid file part: {e}")))?;
                form.ciphertext = Some(data.to_vec());
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid field {name}: {e}")))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    fn text(&self, name: &str) -> Result<String, ApiError> {
        self.fields
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))
    }

    fn size(&self, name: &str) -> Result<u64, ApiError> {
        self.text(name)?
            .trim()
            .parse()
            .map_err(|_| ApiError::bad_request(format!("{name} must be a non-negative integer")))
    }

    fn take_ciphertext(&mut self) -> Result<Vec<u8>, ApiError> {
        self.ciphertext
            .take()
            .ok_or_else(|| ApiError::bad_request("No file provided"))
    }

    fn into_new_file(mut self) -> Result<(NewFile, Vec<u8>), ApiError> {
        let ciphertext = self.take_ciphertext()?;
        let new = NewFile {
            owner: self.text("userId")?,
            filename: self.text("filename")?,
            original_name: self.text("originalName")?,
            mime_type: self.text("mimeType")?,
            plaintext_size: self.size("size")?,
            ciphertext_size: ciphertext.len() as u64,
            checksum: self.text("checksum")?,
            key_material: self.text("encryptionKey")?,
            nonce: self.text("iv")?,
            folder_id: self.fields.get("folderId").filter(|v| !v.is_empty()).cloned(),
        };
        Ok((new, ciphertext))
    }

    fn into_replacement(mut self) -> Result<(ContentReplacement, Vec<u8>), ApiError> {
        let ciphertext = self.take_ciphertext()?;
        let content = ContentReplacement {
            plaintext_size: self.size("size")?,
            ciphertext_size: ciphertext.len() as u64,
            checksum: self.text("checksum")?,
            key_material: self.text("encryptionKey")?,
            nonce: self.text("iv")?,
        };
        Ok((content, ciphertext))
    }
}

pub(crate) fn octet_stream(ciphertext: Vec<u8>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Bytes::from(ciphertext),
    )
}

#[utoipa::path(
    post,
    path = "/files",
    tag = "Files",
    request_body(
        content_type = "multipart/form-data",
        description = "Fields userId, filename, originalName, mimeType, size, checksum, encryptionKey, iv, optional folderId, and the ciphertext part `file`"
    ),
    responses(
        (status = 201, body = EncryptedFile),
        (status = 400, description = "Missing or malformed field")
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<EncryptedFile>), ApiError> {
    let (new, ciphertext) = UploadForm::read(multipart).await?.into_new_file()?;
    let vault = state.vault.clone();
    let file = run_blocking(move || vault.create_file(new, &ciphertext)).await?;
    Ok((StatusCode::CREATED, Json(file)))
}

#[utoipa::path(
    get,
    path = "/files/{id}",
    params(("id" = String, Path, description = "File identifier")),
    tag = "Files",
    responses((status = 200, body = EncryptedFile), (status = 404))
)]
pub async fn get_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EncryptedFile>, ApiError> {
    let vault = state.vault.clone();
    Ok(Json(run_blocking(move || vault.get_file(&id)).await?))
}

#[utoipa::path(
    get,
    path = "/files/{id}/content",
    params(("id" = String, Path, description = "File identifier")),
    tag = "Files",
    responses(
        (status = 200, description = "Ciphertext including the GCM tag", content_type = "application/octet-stream"),
        (status = 404)
    )
)]
pub async fn get_file_content(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let vault = state.vault.clone();
    let content = run_blocking(move || vault.file_content(&id)).await?;
    Ok(octet_stream(content.ciphertext))
}

#[utoipa::path(
    put,
    path = "/files/{id}",
    params(("id" = String, Path, description = "File identifier")),
    request_body = FileUpdateRequest,
    tag = "Files",
    responses((status = 200, body = EncryptedFile), (status = 404))
)]
pub async fn update_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<FileUpdateRequest>,
) -> Result<Json<EncryptedFile>, ApiError> {
    let vault = state.vault.clone();
    Ok(Json(
        run_blocking(move || vault.update_metadata(&id, request)).await?,
    ))
}

#[utoipa::path(
    put,
    path = "/files/{id}/content",
    params(("id" = String, Path, description = "File identifier")),
    request_body(
        content_type = "multipart/form-data",
        description = "Fields size, checksum, encryptionKey, iv and the ciphertext part `file`"
    ),
    tag = "Files",
    responses((status = 200, body = EncryptedFile), (status = 400), (status = 404))
)]
pub async fn replace_file_content(
    Path(id): Path<String>,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EncryptedFile>, ApiError> {
    let (content, ciphertext) = UploadForm::read(multipart).await?.into_replacement()?;
    let vault = state.vault.clone();
    let file = run_blocking(move || vault.replace_content(&id, content, &ciphertext)).await?;
    Ok(Json(file))
}

#[utoipa::path(
    delete,
    path = "/files/{id}",
    params(("id" = String, Path, description = "File identifier")),
    tag = "Files",
    responses((status = 200, body = FileMessageResponse), (status = 404))
)]
pub async fn delete_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<FileMessageResponse>, ApiError> {
    let vault = state.vault.clone();
    let file = run_blocking(move || vault.delete_file(&id)).await?;
    Ok(Json(FileMessageResponse {
        message: "File moved to trash".to_string(),
        file,
    }))
}

#[utoipa::path(
    post,
    path = "/files/{id}/restore",
    params(("id" = String, Path, description = "File identifier")),
    tag = "Files",
    responses((status = 200, body = FileMessageResponse), (status = 400), (status = 404))
)]
pub async fn restore_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<FileMessageResponse>, ApiError> {
    let vault = state.vault.clone();
    let file = run_blocking(move || vault.restore_file(&id)).await?;
    Ok(Json(FileMessageResponse {
        message: "File restored".to_string(),
        file,
    }))
}

#[utoipa::path(
    delete,
    path = "/files/{id}/purge",
    params(("id" = String, Path, description = "File identifier")),
    tag = "Files",
    responses((status = 200, body = FileMessageResponse), (status = 404))
)]
pub async fn purge_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<FileMessageResponse>, ApiError> {
    let vault = state.vault.clone();
    let file = run_blocking(move || vault.purge_file(&id)).await?;
    Ok(Json(FileMessageResponse {
        message: "File permanently deleted".to_string(),
        file,
    }))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/files",
    params(("user_id" = String, Path, description = "Owner identifier")),
    tag = "Files",
    responses((status = 200, body = [EncryptedFile]))
)]
pub async fn list_user_files(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<EncryptedFile>>, ApiError> {
    let vault = state.vault.clone();
    Ok(Json(run_blocking(move || vault.list_files(&user_id)).await?))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/trash",
    params(("user_id" = String, Path, description = "Owner identifier")),
    tag = "Files",
    responses((status = 200, body = [EncryptedFile]))
)]
pub async fn list_user_trash(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<EncryptedFile>>, ApiError> {
    let vault = state.vault.clone();
    Ok(Json(run_blocking(move || vault.list_trash(&user_id)).await?))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/stats",
    params(("user_id" = String, Path, description = "Owner identifier")),
    tag = "Files",
    responses((status = 200, body = UserStats))
)]
pub async fn user_stats(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UserStats>, ApiError> {
    let vault = state.vault.clone();
    Ok(Json(run_blocking(move || vault.stats(&user_id)).await?))
}
