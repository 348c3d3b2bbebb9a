//! Persistent audit configuration, including every timing threshold the
//! reconciler and sweeper consult.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::AuditConfigId;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditConfig {
    #[schema(value_type = String)]
    pub id: AuditConfigId,
    pub name: String,
    pub active: bool,
    /// Master switch; when false nothing is captured.
    pub enable_auditing: bool,
    pub log_read: bool,
    pub log_write: bool,
    pub log_create: bool,
    pub log_unlink: bool,
    /// When true every user is audited; otherwise only the allow-listed ones.
    pub all_users: bool,
    /// When true every model is audited; otherwise only the allow-listed ones.
    pub all_models: bool,
    /// Log entries and terminal sessions older than this are purged by the
    /// maintenance job. Zero disables retention cleanup.
    pub auto_cleanup_days: i32,
    /// Sessions older than this are expired regardless of activity.
    pub session_timeout_hours: i32,
    /// A just-closed session with the same identifier is reopened instead of
    /// replaced when the new login arrives within this window.
    pub reuse_grace_minutes: i32,
    /// An active session is closed when the user has a newer login and this
    /// much time passed without activity.
    pub inactive_close_minutes: i32,
    /// An active session is closed as browser-gone after this long without
    /// any heartbeat or activity.
    pub heartbeat_silence_minutes: i32,
    /// Emergency logout only considers sessions opened within this window.
    pub logout_recent_window_hours: i32,
}

impl AuditConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::hours(self.session_timeout_hours.max(0) as i64)
    }

    pub fn reuse_grace(&self) -> Duration {
        Duration::minutes(self.reuse_grace_minutes.max(0) as i64)
    }

    pub fn inactive_close(&self) -> Duration {
        Duration::minutes(self.inactive_close_minutes.max(0) as i64)
    }

    pub fn heartbeat_silence(&self) -> Duration {
        Duration::minutes(self.heartbeat_silence_minutes.max(0) as i64)
    }

    pub fn logout_recent_window(&self) -> Duration {
        Duration::hours(self.logout_recent_window_hours.max(0) as i64)
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            id: AuditConfigId::new(),
            name: "default".to_string(),
            active: true,
            enable_auditing: true,
            log_read: false,
            log_write: true,
            log_create: true,
            log_unlink: true,
            all_users: true,
            all_models: false,
            auto_cleanup_days: 90,
            session_timeout_hours: 24,
            reuse_grace_minutes: 5,
            inactive_close_minutes: 30,
            heartbeat_silence_minutes: 60,
            logout_recent_window_hours: 2,
        }
    }
}

/// Payload accepted when updating the configuration. Absent fields keep
/// their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AuditConfigUpdate {
    pub name: Option<String>,
    pub enable_auditing: Option<bool>,
    pub log_read: Option<bool>,
    pub log_write: Option<bool>,
    pub log_create: Option<bool>,
    pub log_unlink: Option<bool>,
    pub all_users: Option<bool>,
    pub all_models: Option<bool>,
    pub auto_cleanup_days: Option<i32>,
    pub session_timeout_hours: Option<i32>,
    pub reuse_grace_minutes: Option<i32>,
    pub inactive_close_minutes: Option<i32>,
    pub heartbeat_silence_minutes: Option<i32>,
    pub logout_recent_window_hours: Option<i32>,
}

impl AuditConfigUpdate {
    /// Applies the update on top of an existing configuration.
    pub fn apply(self, mut config: AuditConfig) -> AuditConfig {
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(v) = self.enable_auditing {
            config.enable_auditing = v;
        }
        if let Some(v) = self.log_read {
            config.log_read = v;
        }
        if let Some(v) = self.log_write {
            config.log_write = v;
        }
        if let Some(v) = self.log_create {
            config.log_create = v;
        }
        if let Some(v) = self.log_unlink {
            config.log_unlink = v;
        }
        if let Some(v) = self.all_users {
            config.all_users = v;
        }
        if let Some(v) = self.all_models {
            config.all_models = v;
        }
        if let Some(v) = self.auto_cleanup_days {
            config.auto_cleanup_days = v;
        }
        if let Some(v) = self.session_timeout_hours {
            config.session_timeout_hours = v;
        }
        if let Some(v) = self.reuse_grace_minutes {
            config.reuse_grace_minutes = v;
        }
        if let Some(v) = self.inactive_close_minutes {
            config.inactive_close_minutes = v;
        }
        if let Some(v) = self.heartbeat_silence_minutes {
            config.heartbeat_silence_minutes = v;
        }
        if let Some(v) = self.logout_recent_window_hours {
            config.logout_recent_window_hours = v;
        }
        config
    }
}
