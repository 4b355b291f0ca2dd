// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use super::{files::octet_stream, run_blocking};
use crate::{
    error::ApiError,
    models::{EncryptedFile, FileMessageResponse, ShareRequest, ShareResponse},
    sharing::ShareTtl,
    state::AppState,
};

impl ShareRequest {
    /// `expiresAt` wins over `expiresIn`; neither means "never".
    pub fn ttl(&self) -> ShareTtl {
        match (self.expires_at, self.expires_in) {
            (Some(at), _) => ShareTtl::Until(at),
            (None, Some(preset)) => preset.into(),
            (None, None) => ShareTtl::Never,
        }
    }
}

#[utoipa::path(
    post,
    path = "/files/{id}/share",
    params(("id" = String, Path, description = "File identifier")),
    request_body = ShareRequest,
    tag = "Sharing",
    responses(
        (status = 200, body = ShareResponse),
        (status = 400, description = "Expiry is not in the future"),
        (status = 404)
    )
)]
pub async fn share_file(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ShareRequest>,
) -> Result<Json<ShareResponse>, ApiError> {
    let vault = state.vault.clone();
    let issued = run_blocking(move || vault.share_file(&id, request.ttl())).await?;
    Ok(Json(ShareResponse {
        share_url: state.config.share_url(&issued.token),
        share_token: issued.token,
        expires_at: issued.expires_at,
        file: issued.file,
    }))
}

#[utoipa::path(
    delete,
    path = "/files/{id}/share",
    params(("id" = String, Path, description = "File identifier")),
    tag = "Sharing",
    responses((status = 200, body = FileMessageResponse), (status = 404))
)]
pub async fn revoke_share(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<FileMessageResponse>, ApiError> {
    let vault = state.vault.clone();
    let revocation = run_blocking(move || vault.revoke_share(&id)).await?;
    let message = if revocation.previous_token.is_some() {
        "Share link revoked"
    } else {
        "File was not shared"
    };
    Ok(Json(FileMessageResponse {
        message: message.to_string(),
        file: revocation.file,
    }))
}

#[utoipa::path(
    get,
    path = "/shared/{token}",
    params(("token" = String, Path, description = "Share token")),
    tag = "Sharing",
    responses(
        (status = 200, body = EncryptedFile),
        (status = 404, description = "Unknown, revoked or expired link")
    )
)]
pub async fn get_shared(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EncryptedFile>, ApiError> {
    let vault = state.vault.clone();
    Ok(Json(run_blocking(move || vault.resolve_shared(&token)).await?))
}

#[utoipa::path(
    get,
    path = "/shared/{token}/content",
    params(("token" = String, Path, description = "Share token")),
    tag = "Sharing",
    responses(
        (status = 200, description = "Ciphertext including the GCM tag", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown, revoked or expired link")
    )
)]
pub async fn get_shared_content(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let vault = state.vault.clone();
    let content = run_blocking(move || vault.shared_content(&token)).await?;
    Ok(octet_stream(content.ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::models::SharePreset;
    use crate::vault::test_support::encrypted_upload;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::{TimeDelta, Utc};
    use tower::ServiceExt;

    fn stored_file(state: &AppState) -> EncryptedFile {
        let (new, ciphertext) = encrypted_upload("alice", "photo.jpg", b"jpeg bytes");
        state.vault.create_file(new, &ciphertext).unwrap()
    }

    #[test]
    fn request_ttl_precedence() {
        let at = Utc::now() + TimeDelta::hours(2);
        let both = ShareRequest {
            expires_at: Some(at),
            expires_in: Some(SharePreset::Day),
        };
        assert_eq!(both.ttl(), ShareTtl::Until(at));

        let preset = ShareRequest {
            expires_at: None,
            expires_in: Some(SharePreset::Week),
        };
        assert_eq!(preset.ttl(), ShareTtl::For(TimeDelta::days(7)));
        assert_eq!(ShareRequest::default().ttl(), ShareTtl::Never);
    }

    #[tokio::test]
    async fn share_resolve_revoke_round() {
        let (_temp, state) = test_state();
        let file = stored_file(&state);

        let Json(shared) = share_file(
            Path(file.id.clone()),
            State(state.clone()),
            Json(ShareRequest {
                expires_at: None,
                expires_in: Some(SharePreset::Day),
            }),
        )
        .await
        .unwrap();
        assert_eq!(shared.share_token.len(), 64);
        assert_eq!(
            shared.share_url,
            format!("http://localhost:8080/shared/{}", shared.share_token)
        );
        assert!(shared.expires_at.is_some());
        assert!(shared.file.is_shared);

        let Json(resolved) = get_shared(Path(shared.share_token.clone()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(resolved.id, file.id);

        let Json(revoked) = revoke_share(Path(file.id.clone()), State(state.clone()))
            .await
            .unwrap();
        assert_eq!(revoked.message, "Share link revoked");
        assert!(!revoked.file.is_shared);

        let err = get_shared(Path(shared.share_token), State(state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let Json(again) = revoke_share(Path(file.id), State(state)).await.unwrap();
        assert_eq!(again.message, "File was not shared");
    }

    #[tokio::test]
    async fn past_expiry_is_bad_request() {
        let (_temp, state) = test_state();
        let file = stored_file(&state);

        let err = share_file(
            Path(file.id),
            State(state),
            Json(ShareRequest {
                expires_at: Some(Utc::now() - TimeDelta::minutes(5)),
                expires_in: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn shared_content_over_http() {
        let (_temp, state) = test_state();
        let file = stored_file(&state);
        let app = crate::api::router(state);

        let response = app
            .clone()
            .oneshot(
                Request::post(format!("/files/{}/share", file.id))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"expiresIn":"never"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let shared: ShareResponse = serde_json::from_slice(&body).unwrap();
        assert!(shared.expires_at.is_none());

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/shared/{}/content", shared.share_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len() as u64, file.ciphertext_size);

        let response = app
            .oneshot(
                Request::get(format!("/shared/{}", "0".repeat(64)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleted_file_link_is_not_found() {
        let (_temp, state) = test_state();
        let file = stored_file(&state);
        let issued = state.vault.share_file(&file.id, ShareTtl::Never).unwrap();
        state.vault.delete_file(&file.id).unwrap();

        let err = get_shared(Path(issued.token), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
