// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderName,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::{ApiError, VaultError},
    models::{
        EncryptedFile, FileMessageResponse, FileUpdateRequest, SharePreset,
        ShareRequest, ShareResponse, UserStats,
    },
    state::AppState,
    storage::{AuditEvent, AuditEventType},
};

pub mod audit;
pub mod files;
pub mod health;
pub mod shares;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/files", post(files::upload_file))
        .route(
            "/files/{id}",
            get(files::get_file)
                .put(files::update_file)
                .delete(files::delete_file),
        )
        .route(
            "/files/{id}/content",
            get(files::get_file_content).put(files::replace_file_content),
        )
        .route("/files/{id}/restore", post(files::restore_file))
        .route("/files/{id}/purge", delete(files::purge_file))
        .route(
            "/files/{id}/share",
            post(shares::share_file).delete(shares::revoke_share),
        )
        .route("/shared/{token}", get(shares::get_shared))
        .route("/shared/{token}/content", get(shares::get_shared_content))
        .route("/users/{user_id}/files", get(files::list_user_files))
        .route("/users/{user_id}/trash", get(files::list_user_trash))
        .route("/users/{user_id}/stats", get(files::user_stats))
        .route("/users/{user_id}/audit", get(audit::list_audit_events))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Run a blocking vault call (file I/O, redb) off the async workers.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, VaultError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "blocking vault task failed");
            ApiError::internal("Internal error")
        })?
        .map_err(ApiError::from)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        files::upload_file,
        files::get_file,
        files::get_file_content,
        files::update_file,
        files::replace_file_content,
        files::delete_file,
        files::restore_file,
        files::purge_file,
        files::list_user_files,
        files::list_user_trash,
        files::user_stats,
        shares::share_file,
        shares::revoke_share,
        shares::get_shared,
        shares::get_shared_content,
        audit::list_audit_events
    ),
    components(
        schemas(
            EncryptedFile,
            FileMessageResponse,
            FileUpdateRequest,
            SharePreset,
            ShareRequest,
            ShareResponse,
            UserStats,
            AuditEvent,
            AuditEventType,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Files", description = "Encrypted file records, content and trash"),
        (name = "Sharing", description = "Time-limited, revocable share links"),
        (name = "Audit", description = "Per-user audit trail"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;


#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn router_serves_health_and_openapi() {
        let (_temp, state) = test_state();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let response = app
            .oneshot(
                Request::get("/api-doc/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn openapi_lists_share_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/files/{id}/share"));
        assert!(doc.paths.paths.contains_key("/shared/{token}"));
    }
}
