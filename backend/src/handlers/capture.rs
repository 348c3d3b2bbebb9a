//! Change capture endpoints and readable rendering of stored entries.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::AppError,
    models::audit_log::{ActionType, AuditLogEntry},
    repositories::audit_log as log_repo,
    services::capture::{CaptureError, CaptureRequest, CaptureService},
    services::describe,
    state::AppState,
    types::{AuditLogId, UserId},
};

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub captured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<AuditLogEntry>,
}

pub async fn capture(
    State(state): State<AppState>,
    Json(payload): Json<CaptureRequest>,
) -> Result<Json<CaptureResponse>, AppError> {
    let service = CaptureService::new(state.pool.clone(), state.gate.clone());
    let entry = service.capture(payload).await.map_err(|err| match err {
        CaptureError::Database(e) => AppError::from(e),
        other => AppError::BadRequest(other.to_string()),
    })?;
    Ok(Json(CaptureResponse {
        captured: entry.is_some(),
        entry,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ShouldAuditQuery {
    pub model: String,
    pub action: ActionType,
    pub user_id: UserId,
    pub origin: Option<String>,
}

/// Probe used by clients to skip building payloads the gate would discard.
pub async fn should_audit(
    State(state): State<AppState>,
    Query(query): Query<ShouldAuditQuery>,
) -> Json<Value> {
    let audit = state
        .gate
        .should_audit(
            &query.model,
            query.action,
            query.user_id,
            query.origin.as_deref(),
        )
        .await;
    Json(json!({ "audit": audit }))
}

#[derive(Debug, Serialize)]
pub struct DescribeResponse {
    pub entry: AuditLogEntry,
    pub old_readable: Option<String>,
    pub new_readable: Option<String>,
    pub summary: String,
}

pub async fn describe_log(
    State(state): State<AppState>,
    Path(id): Path<AuditLogId>,
) -> Result<Json<DescribeResponse>, AppError> {
    let entry = log_repo::fetch_log_entry(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Audit log entry not found".into()))?;

    let described = describe::describe(&entry, &state.catalog);
    Ok(Json(DescribeResponse {
        entry,
        old_readable: described.old_readable,
        new_readable: described.new_readable,
        summary: described.summary,
    }))
}
