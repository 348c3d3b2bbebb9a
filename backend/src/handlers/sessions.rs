//! Session lifecycle endpoints: login, logout, heartbeat, and failed-login
//! recording.

use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppError,
    models::session::{Session, SessionContext},
    repositories::session as session_repo,
    services::reconciler::{LogoutOutcome, Reconciler, ReconcileTrace},
    state::AppState,
    types::UserId,
    utils::{geoip, user_agent::DeviceMetadata},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginPayload {
    #[schema(value_type = String)]
    pub user_id: UserId,
    #[validate(length(min = 1, max = 256))]
    pub session_sid: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session: Session,
    pub created: bool,
    pub trace: ReconcileTrace,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let metadata = DeviceMetadata::from_headers(&headers);
    let mut context = SessionContext {
        ip_address: metadata.ip_address,
        user_agent: metadata.user_agent,
        browser: metadata.browser,
        os: metadata.os,
        device_type: metadata.device_type,
        country: None,
        city: None,
    };

    if state.config.geoip_enabled {
        if let Some(ip) = context.ip_address.as_deref() {
            if let Some(location) = geoip::lookup(ip).await {
                context.country = location.country;
                context.city = location.city;
            }
        }
    }

    let reconciler = Reconciler::new(state.pool.clone(), state.gate.clone());
    let outcome = reconciler
        .login(payload.user_id, &payload.session_sid, context)
        .await?;

    Ok(Json(LoginResponse {
        session: outcome.session,
        created: outcome.created,
        trace: outcome.trace,
    }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LogoutPayload {
    #[validate(length(min = 1, max = 256))]
    pub session_sid: Option<String>,
    #[schema(value_type = Option<String>)]
    pub user_id: Option<UserId>,
    #[validate(length(max = 512))]
    pub reason: Option<String>,
}

pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<LogoutPayload>,
) -> Result<Json<LogoutOutcome>, AppError> {
    payload.validate()?;
    if payload.session_sid.is_none() && payload.user_id.is_none() {
        return Err(AppError::BadRequest(
            "session_sid or user_id is required".into(),
        ));
    }

    let reconciler = Reconciler::new(state.pool.clone(), state.gate.clone());
    let outcome = reconciler
        .logout(
            payload.session_sid.as_deref(),
            payload.user_id,
            payload.reason.as_deref(),
        )
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct HeartbeatPayload {
    #[validate(length(min = 1, max = 256))]
    pub session_sid: String,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(payload): Json<HeartbeatPayload>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;
    let acknowledged =
        session_repo::touch_heartbeat(&state.pool, &payload.session_sid, chrono::Utc::now())
            .await?;
    Ok(Json(json!({ "acknowledged": acknowledged })))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct FailedLoginPayload {
    #[schema(value_type = String)]
    pub user_id: UserId,
    #[validate(length(min = 1, max = 256))]
    pub session_sid: Option<String>,
    #[validate(length(min = 1, max = 512))]
    pub reason: String,
}

/// Records a failed login attempt as a terminal error session.
pub async fn login_failed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<FailedLoginPayload>,
) -> Result<Json<Session>, AppError> {
    payload.validate()?;

    let metadata = DeviceMetadata::from_headers(&headers);
    let context = SessionContext {
        ip_address: metadata.ip_address,
        user_agent: metadata.user_agent,
        browser: metadata.browser,
        os: metadata.os,
        device_type: metadata.device_type,
        country: None,
        city: None,
    };

    let reconciler = Reconciler::new(state.pool.clone(), state.gate.clone());
    let session = reconciler
        .record_failed_login(
            payload.user_id,
            payload.session_sid.as_deref(),
            &payload.reason,
            context,
        )
        .await?;
    Ok(Json(session))
}
