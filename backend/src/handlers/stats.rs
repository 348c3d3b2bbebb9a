//! Query and debug surface: aggregate statistics, per-user history, and a
//! dry-run view of the login reconciliation plan.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use utoipa::ToSchema;

use crate::{
    error::AppError,
    models::audit_log::AuditLogEntry,
    models::session::Session,
    repositories::{audit_log as log_repo, session as session_repo},
    services::reconciler::{plan_login, LoginPlan},
    services::sweeper::{SweepReport, Sweeper},
    state::AppState,
    types::{SessionId, UserId},
};

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    /// Look-back window in days.
    pub days: Option<i64>,
    pub limit: Option<i64>,
}

impl WindowQuery {
    fn since(&self) -> chrono::DateTime<Utc> {
        Utc::now() - Duration::days(self.days.unwrap_or(30).clamp(1, 3650))
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }
}

fn counts_to_object(counts: Vec<(String, i64)>) -> Value {
    let mut map = Map::new();
    for (key, count) in counts {
        map.insert(key, json!(count));
    }
    Value::Object(map)
}

pub async fn session_stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let counts = session_repo::count_by_status(&state.pool).await?;
    Ok(Json(json!({ "by_status": counts_to_object(counts) })))
}

pub async fn action_stats(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Value>, AppError> {
    let counts = log_repo::count_by_action(&state.pool, query.since()).await?;
    Ok(Json(json!({ "by_action": counts_to_object(counts) })))
}

pub async fn model_stats(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Value>, AppError> {
    let counts = log_repo::count_by_model(&state.pool, query.since(), query.limit()).await?;
    let rows: Vec<Value> = counts
        .into_iter()
        .map(|(model, entries)| json!({ "model_name": model, "entries": entries }))
        .collect();
    Ok(Json(json!({ "models": rows })))
}

pub async fn user_stats(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Value>, AppError> {
    let counts = log_repo::top_users(&state.pool, query.since(), query.limit()).await?;
    let rows: Vec<Value> = counts
        .into_iter()
        .map(|(user_id, entries)| json!({ "user_id": user_id, "entries": entries }))
        .collect();
    Ok(Json(json!({ "users": rows })))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: Session,
    pub duration_hours: f64,
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionDetail>, AppError> {
    let session = session_repo::fetch_session(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".into()))?;
    let duration_hours = session.duration_hours();
    Ok(Json(SessionDetail {
        session,
        duration_hours,
    }))
}

pub async fn user_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<Session>>, AppError> {
    let sessions = session_repo::sessions_for_user(&state.pool, user_id, query.limit()).await?;
    Ok(Json(sessions))
}

pub async fn session_logs(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, AppError> {
    // 404 for a session that never existed beats an empty list.
    session_repo::fetch_session(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".into()))?;
    let logs = log_repo::logs_for_session(&state.pool, id, query.limit().max(50)).await?;
    Ok(Json(logs))
}

#[derive(Debug, Deserialize)]
pub struct LoginPlanQuery {
    pub user_id: UserId,
    pub session_sid: String,
}

/// Dry run of login reconciliation: shows the plan that would be applied
/// right now, without touching anything.
pub async fn debug_login_plan(
    State(state): State<AppState>,
    Query(query): Query<LoginPlanQuery>,
) -> Result<Json<LoginPlan>, AppError> {
    let now = Utc::now();
    let settings = state.gate.settings().await;

    let same_sid = session_repo::find_sessions_by_sid(&state.pool, &query.session_sid).await?;
    let other_active: Vec<Session> =
        session_repo::find_active_for_user(&state.pool, query.user_id)
            .await?
            .into_iter()
            .filter(|s| s.session_sid != query.session_sid)
            .collect();

    let plan = plan_login(
        query.user_id,
        &same_sid,
        &other_active,
        now,
        settings.reuse_grace(),
        settings.session_timeout(),
    );
    Ok(Json(plan))
}

/// Runs one sweep pass immediately. The scheduled binary does the same on a
/// timer; this endpoint exists for operators.
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    let sweeper = Sweeper::new(
        state.pool.clone(),
        state.gate.clone(),
        state.config.sweep_batch_size,
    );
    let report = sweeper.sweep().await?;
    Ok(Json(report))
}
