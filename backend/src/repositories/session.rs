//! Persistence layer for session rows.
//!
//! All status transitions out of `active` are guarded with
//! `status = 'active'` in the WHERE clause so concurrent closers cannot
//! overwrite a terminal state.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;

use crate::models::session::{Session, SessionContext, SessionStatus};
use crate::types::{SessionId, UserId};

const SESSION_COLUMNS: &str = "id, user_id, session_sid, login_time, logout_time, last_activity, \
     heartbeat_count, ip_address, user_agent, device_type, browser, os, country, city, \
     status, browser_closed, error_message";

pub async fn insert_session(pool: &PgPool, session: &Session) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_sessions \
         (id, user_id, session_sid, login_time, logout_time, last_activity, heartbeat_count, \
         ip_address, user_agent, device_type, browser, os, country, city, status, \
         browser_closed, error_message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(session.id)
    .bind(session.user_id)
    .bind(&session.session_sid)
    .bind(session.login_time)
    .bind(session.logout_time)
    .bind(session.last_activity)
    .bind(session.heartbeat_count)
    .bind(&session.ip_address)
    .bind(&session.user_agent)
    .bind(session.device_type)
    .bind(&session.browser)
    .bind(&session.os)
    .bind(&session.country)
    .bind(&session.city)
    .bind(session.status)
    .bind(session.browser_closed)
    .bind(&session.error_message)
    .execute(pool)
    .await
    .map(|_| ())
}

pub async fn fetch_session(
    pool: &PgPool,
    id: SessionId,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM audit_sessions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// All rows ever created for a transport identifier, newest login first.
pub async fn find_sessions_by_sid(
    pool: &PgPool,
    session_sid: &str,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM audit_sessions \
         WHERE session_sid = $1 \
         ORDER BY login_time DESC, id DESC"
    ))
    .bind(session_sid)
    .fetch_all(pool)
    .await
}

pub async fn find_active_by_sid(
    pool: &PgPool,
    session_sid: &str,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM audit_sessions \
         WHERE session_sid = $1 AND status = 'active' \
         ORDER BY login_time DESC, id DESC \
         LIMIT 1"
    ))
    .bind(session_sid)
    .fetch_optional(pool)
    .await
}

/// Active sessions for a user, newest login first.
pub async fn find_active_for_user(
    pool: &PgPool,
    user_id: UserId,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM audit_sessions \
         WHERE user_id = $1 AND status = 'active' \
         ORDER BY login_time DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn find_latest_active_for_user(
    pool: &PgPool,
    user_id: UserId,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM audit_sessions \
         WHERE user_id = $1 AND status = 'active' \
         ORDER BY login_time DESC, id DESC \
         LIMIT 1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Restarts a session row for a fresh login, whether the row is still
/// active or was closed moments ago. The login clock and heartbeat counter
/// reset and the client metadata is replaced with what this login sent.
pub async fn reopen_session(
    pool: &PgPool,
    id: SessionId,
    context: &SessionContext,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE audit_sessions \
         SET status = 'active', login_time = $1, last_activity = $1, logout_time = NULL, \
             browser_closed = FALSE, error_message = NULL, heartbeat_count = 0, \
             ip_address = $2, user_agent = $3, device_type = $4, browser = $5, os = $6, \
             country = $7, city = $8 \
         WHERE id = $9",
    )
    .bind(now)
    .bind(&context.ip_address)
    .bind(&context.user_agent)
    .bind(context.device_type)
    .bind(&context.browser)
    .bind(&context.os)
    .bind(&context.country)
    .bind(&context.city)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Moves a set of active sessions to a terminal status in one statement.
/// Rows already terminal are left untouched.
pub async fn close_sessions(
    pool: &PgPool,
    ids: &[SessionId],
    status: SessionStatus,
    browser_closed: bool,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }
    let id_strings: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    let result = sqlx::query(
        "UPDATE audit_sessions \
         SET status = $1, logout_time = $2, last_activity = $2, browser_closed = $3, \
             error_message = COALESCE($4, error_message) \
         WHERE id = ANY($5) AND status = 'active'",
    )
    .bind(status)
    .bind(now)
    .bind(browser_closed)
    .bind(reason)
    .bind(&id_strings)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Records a heartbeat against the active session holding this identifier.
pub async fn touch_heartbeat(
    pool: &PgPool,
    session_sid: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE audit_sessions \
         SET last_activity = $1, heartbeat_count = heartbeat_count + 1 \
         WHERE session_sid = $2 AND status = 'active'",
    )
    .bind(now)
    .bind(session_sid)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Refreshes activity without counting a heartbeat, used for ordinary requests.
pub async fn touch_activity(
    pool: &PgPool,
    session_sid: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE audit_sessions \
         SET last_activity = $1 \
         WHERE session_sid = $2 AND status = 'active'",
    )
    .bind(now)
    .bind(session_sid)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Points an active session at a new transport identifier.
pub async fn update_session_sid(
    pool: &PgPool,
    id: SessionId,
    session_sid: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE audit_sessions \
         SET session_sid = $1, last_activity = $2 \
         WHERE id = $3 AND status = 'active'",
    )
    .bind(session_sid)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Keyset page over active sessions, ordered by id. Pass the last id of the
/// previous page to continue.
pub async fn list_active_batch(
    pool: &PgPool,
    after: Option<SessionId>,
    batch_size: i64,
) -> Result<Vec<Session>, sqlx::Error> {
    match after {
        Some(last) => {
            sqlx::query_as::<_, Session>(&format!(
                "SELECT {SESSION_COLUMNS} FROM audit_sessions \
                 WHERE status = 'active' AND id > $1 \
                 ORDER BY id \
                 LIMIT $2"
            ))
            .bind(last)
            .bind(batch_size)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Session>(&format!(
                "SELECT {SESSION_COLUMNS} FROM audit_sessions \
                 WHERE status = 'active' \
                 ORDER BY id \
                 LIMIT $1"
            ))
            .bind(batch_size)
            .fetch_all(pool)
            .await
        }
    }
}

/// Newest active login time per user, for detecting superseded sessions.
pub async fn newest_active_login_per_user(
    pool: &PgPool,
) -> Result<HashMap<UserId, DateTime<Utc>>, sqlx::Error> {
    let rows: Vec<(UserId, DateTime<Utc>)> = sqlx::query_as(
        "SELECT user_id, MAX(login_time) \
         FROM audit_sessions \
         WHERE status = 'active' \
         GROUP BY user_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT status, COUNT(*) FROM audit_sessions GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await
}

/// Full session history for a user, newest first.
pub async fn sessions_for_user(
    pool: &PgPool,
    user_id: UserId,
    limit: i64,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM audit_sessions \
         WHERE user_id = $1 \
         ORDER BY login_time DESC, id DESC \
         LIMIT $2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Retention cleanup: removes terminal sessions that ended before the cutoff.
/// Active rows are never deleted here.
pub async fn delete_sessions_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM audit_sessions \
         WHERE status <> 'active' AND COALESCE(logout_time, login_time) < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
