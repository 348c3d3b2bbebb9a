//! Persistence layer for the audit configuration and its allow-lists.

use sqlx::PgPool;

use crate::models::audit_config::AuditConfig;
use crate::types::{AuditConfigId, UserId};

const CONFIG_COLUMNS: &str = "id, name, active, enable_auditing, log_read, log_write, \
     log_create, log_unlink, all_users, all_models, auto_cleanup_days, session_timeout_hours, \
     reuse_grace_minutes, inactive_close_minutes, heartbeat_silence_minutes, \
     logout_recent_window_hours";

/// The single active configuration row, if one exists.
pub async fn fetch_active_config(pool: &PgPool) -> Result<Option<AuditConfig>, sqlx::Error> {
    sqlx::query_as::<_, AuditConfig>(&format!(
        "SELECT {CONFIG_COLUMNS} FROM audit_configs WHERE active = TRUE ORDER BY id LIMIT 1"
    ))
    .fetch_optional(pool)
    .await
}

pub async fn update_config(pool: &PgPool, config: &AuditConfig) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE audit_configs \
         SET name = $1, enable_auditing = $2, log_read = $3, log_write = $4, log_create = $5, \
             log_unlink = $6, all_users = $7, all_models = $8, auto_cleanup_days = $9, \
             session_timeout_hours = $10, reuse_grace_minutes = $11, \
             inactive_close_minutes = $12, heartbeat_silence_minutes = $13, \
             logout_recent_window_hours = $14 \
         WHERE id = $15",
    )
    .bind(&config.name)
    .bind(config.enable_auditing)
    .bind(config.log_read)
    .bind(config.log_write)
    .bind(config.log_create)
    .bind(config.log_unlink)
    .bind(config.all_users)
    .bind(config.all_models)
    .bind(config.auto_cleanup_days)
    .bind(config.session_timeout_hours)
    .bind(config.reuse_grace_minutes)
    .bind(config.inactive_close_minutes)
    .bind(config.heartbeat_silence_minutes)
    .bind(config.logout_recent_window_hours)
    .bind(config.id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_allowed_users(
    pool: &PgPool,
    config_id: AuditConfigId,
) -> Result<Vec<UserId>, sqlx::Error> {
    let rows: Vec<(UserId,)> = sqlx::query_as(
        "SELECT user_id FROM audit_config_users WHERE config_id = $1 ORDER BY user_id",
    )
    .bind(config_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn list_allowed_models(
    pool: &PgPool,
    config_id: AuditConfigId,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT model_name FROM audit_config_models WHERE config_id = $1 ORDER BY model_name",
    )
    .bind(config_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(name,)| name).collect())
}

pub async fn add_allowed_user(
    pool: &PgPool,
    config_id: AuditConfigId,
    user_id: UserId,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO audit_config_users (config_id, user_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(config_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_allowed_user(
    pool: &PgPool,
    config_id: AuditConfigId,
    user_id: UserId,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM audit_config_users WHERE config_id = $1 AND user_id = $2")
            .bind(config_id)
            .bind(user_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn add_allowed_model(
    pool: &PgPool,
    config_id: AuditConfigId,
    model_name: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO audit_config_models (config_id, model_name) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(config_id)
    .bind(model_name)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn remove_allowed_model(
    pool: &PgPool,
    config_id: AuditConfigId,
    model_name: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM audit_config_models WHERE config_id = $1 AND model_name = $2")
            .bind(config_id)
            .bind(model_name)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}
