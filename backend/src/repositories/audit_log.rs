//! Persistence layer for captured change entries.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::models::audit_log::{ActionType, AuditLogEntry};
use crate::types::{AuditLogId, SessionId, UserId};

const LOG_COLUMNS: &str = "id, user_id, session_id, model_name, record_id, record_label, \
     action_type, action_date, method, old_values, new_values";

/// Criteria for a targeted purge. Empty filters match everything.
#[derive(Debug, Clone, Default)]
pub struct LogPurgeFilters {
    pub before: Option<DateTime<Utc>>,
    pub action_types: Vec<ActionType>,
    pub model_name: Option<String>,
    pub user_id: Option<UserId>,
    pub session_id: Option<SessionId>,
}

pub async fn insert_log_entry(pool: &PgPool, entry: &AuditLogEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_log_entries \
         (id, user_id, session_id, model_name, record_id, record_label, action_type, \
         action_date, method, old_values, new_values) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(entry.id)
    .bind(entry.user_id)
    .bind(entry.session_id)
    .bind(&entry.model_name)
    .bind(&entry.record_id)
    .bind(&entry.record_label)
    .bind(entry.action_type)
    .bind(entry.action_date)
    .bind(&entry.method)
    .bind(&entry.old_values)
    .bind(&entry.new_values)
    .execute(pool)
    .await
    .map(|_| ())
}

pub async fn fetch_log_entry(
    pool: &PgPool,
    id: AuditLogId,
) -> Result<Option<AuditLogEntry>, sqlx::Error> {
    sqlx::query_as::<_, AuditLogEntry>(&format!(
        "SELECT {LOG_COLUMNS} FROM audit_log_entries WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Entries captured under one session, oldest first.
pub async fn logs_for_session(
    pool: &PgPool,
    session_id: SessionId,
    limit: i64,
) -> Result<Vec<AuditLogEntry>, sqlx::Error> {
    sqlx::query_as::<_, AuditLogEntry>(&format!(
        "SELECT {LOG_COLUMNS} FROM audit_log_entries \
         WHERE session_id = $1 \
         ORDER BY action_date, id \
         LIMIT $2"
    ))
    .bind(session_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn count_by_action(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT action_type, COUNT(*) \
         FROM audit_log_entries \
         WHERE action_date >= $1 \
         GROUP BY action_type \
         ORDER BY action_type",
    )
    .bind(since)
    .fetch_all(pool)
    .await
}

pub async fn count_by_model(
    pool: &PgPool,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT model_name, COUNT(*) AS entries \
         FROM audit_log_entries \
         WHERE action_date >= $1 \
         GROUP BY model_name \
         ORDER BY entries DESC, model_name \
         LIMIT $2",
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn top_users(
    pool: &PgPool,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<(UserId, i64)>, sqlx::Error> {
    sqlx::query_as(
        "SELECT user_id, COUNT(*) AS entries \
         FROM audit_log_entries \
         WHERE action_date >= $1 \
         GROUP BY user_id \
         ORDER BY entries DESC, user_id \
         LIMIT $2",
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Retention cleanup used by the maintenance job.
pub async fn delete_logs_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM audit_log_entries WHERE action_date < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Targeted purge driven by operator-supplied filters.
pub async fn purge_logs(pool: &PgPool, filters: &LogPurgeFilters) -> Result<u64, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("DELETE FROM audit_log_entries");
    let mut has_clause = false;
    apply_purge_filters(&mut builder, &mut has_clause, filters);
    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

fn apply_purge_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    has_clause: &mut bool,
    filters: &LogPurgeFilters,
) {
    if let Some(before) = filters.before.as_ref() {
        push_clause(builder, has_clause);
        builder.push("action_date < ").push_bind(before.to_owned());
    }
    if !filters.action_types.is_empty() {
        push_clause(builder, has_clause);
        let actions: Vec<String> = filters
            .action_types
            .iter()
            .map(|a| a.as_str().to_string())
            .collect();
        builder.push("action_type = ANY(").push_bind(actions).push(")");
    }
    if let Some(model_name) = filters.model_name.as_ref() {
        push_clause(builder, has_clause);
        builder
            .push("model_name = ")
            .push_bind(model_name.to_string());
    }
    if let Some(user_id) = filters.user_id.as_ref() {
        push_clause(builder, has_clause);
        builder.push("user_id = ").push_bind(user_id.to_string());
    }
    if let Some(session_id) = filters.session_id.as_ref() {
        push_clause(builder, has_clause);
        builder
            .push("session_id = ")
            .push_bind(session_id.to_string());
    }
}

fn push_clause(builder: &mut QueryBuilder<'_, Postgres>, has_clause: &mut bool) {
    if *has_clause {
        builder.push(" AND ");
    } else {
        builder.push(" WHERE ");
        *has_clause = true;
    }
}
