//! Keeps `last_activity` fresh for the session a request belongs to.
//!
//! The touch is fire-and-forget: it must never add latency to or fail the
//! request it rides on.

use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use chrono::Utc;

use crate::repositories::session as session_repo;
use crate::state::AppState;

const SESSION_SID_HEADER: &str = "x-session-sid";

pub async fn touch_activity(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let sid = req
        .headers()
        .get(SESSION_SID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty());

    if let Some(sid) = sid {
        let pool = state.pool.clone();
        tokio::spawn(async move {
            if let Err(err) = session_repo::touch_activity(&pool, &sid, Utc::now()).await {
                tracing::debug!(error = %err, "activity touch failed");
            }
        });
    }

    next.run(req).await
}
