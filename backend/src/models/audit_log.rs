//! Models describing captured data-change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;

use crate::types::{AuditLogId, SessionId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogEntry {
    pub id: AuditLogId,
    pub user_id: UserId,
    /// Session the change happened under. Null when the session row was
    /// purged after capture.
    pub session_id: Option<SessionId>,
    pub model_name: String,
    pub record_id: String,
    /// Display label of the affected record, when the caller supplied one.
    pub record_label: Option<String>,
    pub action_type: ActionType,
    pub action_date: DateTime<Utc>,
    /// Application method or endpoint that triggered the change.
    pub method: Option<String>,
    /// Changed fields before the mutation. Only the fields that changed.
    pub old_values: Option<Json<Value>>,
    /// Changed fields after the mutation. Only the fields that changed.
    pub new_values: Option<Json<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Write,
    Read,
    Unlink,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Write => "write",
            ActionType::Read => "read",
            ActionType::Unlink => "unlink",
        }
    }

    /// Whether entries of this action may carry pre-change values.
    pub fn allows_old_values(&self) -> bool {
        matches!(self, ActionType::Write | ActionType::Unlink)
    }

    /// Whether entries of this action may carry post-change values.
    pub fn allows_new_values(&self) -> bool {
        matches!(self, ActionType::Create | ActionType::Write)
    }
}

impl Serialize for ActionType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "create" => Ok(ActionType::Create),
            "write" => Ok(ActionType::Write),
            "read" => Ok(ActionType::Read),
            "unlink" => Ok(ActionType::Unlink),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["create", "write", "read", "unlink"],
            )),
        }
    }
}
