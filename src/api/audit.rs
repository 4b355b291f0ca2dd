// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use super::run_blocking;
use crate::{error::ApiError, state::AppState, storage::AuditEvent};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuditQuery {
    /// Day to list (`YYYY-MM-DD`, UTC). Defaults to today.
    pub date: Option<NaiveDate>,
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/audit",
    params(
        ("user_id" = String, Path, description = "Owner identifier"),
        AuditQuery
    ),
    tag = "Audit",
    responses((status = 200, body = [AuditEvent]))
)]
pub async fn list_audit_events(
    Path(user_id): Path<String>,
    Query(query): Query<AuditQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let vault = state.vault.clone();
    Ok(Json(
        run_blocking(move || vault.audit_events(&user_id, date)).await?,
    ))
}
