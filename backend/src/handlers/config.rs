//! Audit configuration management. Every write invalidates the gate cache so
//! the next capture sees the new rules.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::audit_config::{AuditConfig, AuditConfigUpdate},
    models::audit_log::ActionType,
    repositories::{audit_config as config_repo, audit_log as log_repo},
    state::AppState,
    types::{SessionId, UserId},
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigResponse {
    pub config: AuditConfig,
    #[schema(value_type = Vec<String>)]
    pub allowed_users: Vec<UserId>,
    pub allowed_models: Vec<String>,
}

async fn load_config(state: &AppState) -> Result<AuditConfig, AppError> {
    config_repo::fetch_active_config(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("No active audit configuration".into()))
}

pub async fn get_config(State(state): State<AppState>) -> Result<Json<ConfigResponse>, AppError> {
    let config = load_config(&state).await?;
    let allowed_users = config_repo::list_allowed_users(&state.pool, config.id).await?;
    let allowed_models = config_repo::list_allowed_models(&state.pool, config.id).await?;
    Ok(Json(ConfigResponse {
        config,
        allowed_users,
        allowed_models,
    }))
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(payload): Json<AuditConfigUpdate>,
) -> Result<Json<AuditConfig>, AppError> {
    let current = load_config(&state).await?;
    let updated = payload.apply(current);
    config_repo::update_config(&state.pool, &updated).await?;
    state.gate.invalidate().await;
    Ok(Json(updated))
}

pub async fn add_allowed_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Value>, AppError> {
    let config = load_config(&state).await?;
    let added = config_repo::add_allowed_user(&state.pool, config.id, user_id).await?;
    state.gate.invalidate().await;
    Ok(Json(json!({ "added": added })))
}

pub async fn remove_allowed_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Value>, AppError> {
    let config = load_config(&state).await?;
    let removed = config_repo::remove_allowed_user(&state.pool, config.id, user_id).await?;
    state.gate.invalidate().await;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn add_allowed_model(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
) -> Result<Json<Value>, AppError> {
    if model_name.trim().is_empty() {
        return Err(AppError::BadRequest("Model name is required".into()));
    }
    let config = load_config(&state).await?;
    let added = config_repo::add_allowed_model(&state.pool, config.id, &model_name).await?;
    state.gate.invalidate().await;
    Ok(Json(json!({ "added": added })))
}

pub async fn remove_allowed_model(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
) -> Result<Json<Value>, AppError> {
    let config = load_config(&state).await?;
    let removed = config_repo::remove_allowed_model(&state.pool, config.id, &model_name).await?;
    state.gate.invalidate().await;
    Ok(Json(json!({ "removed": removed })))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PurgePayload {
    pub before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub action_types: Vec<ActionType>,
    pub model_name: Option<String>,
    #[schema(value_type = Option<String>)]
    pub user_id: Option<UserId>,
    #[schema(value_type = Option<String>)]
    pub session_id: Option<SessionId>,
}

/// Operator-driven purge of log entries matching the filters. An empty
/// payload is rejected; deleting the whole trail must be explicit.
pub async fn purge_logs(
    State(state): State<AppState>,
    Json(payload): Json<PurgePayload>,
) -> Result<Json<Value>, AppError> {
    let filters = log_repo::LogPurgeFilters {
        before: payload.before,
        action_types: payload.action_types,
        model_name: payload.model_name,
        user_id: payload.user_id,
        session_id: payload.session_id,
    };
    if filters.before.is_none()
        && filters.action_types.is_empty()
        && filters.model_name.is_none()
        && filters.user_id.is_none()
        && filters.session_id.is_none()
    {
        return Err(AppError::BadRequest(
            "At least one purge filter is required".into(),
        ));
    }

    let deleted = log_repo::purge_logs(&state.pool, &filters).await?;
    tracing::info!(deleted, "audit log purge completed");
    Ok(Json(json!({ "deleted": deleted })))
}
