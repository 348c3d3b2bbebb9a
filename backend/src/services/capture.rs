//! Change capture: gating, session attribution, and persistence of one
//! audit entry per mutation.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use sqlx::types::Json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::db::connection::DbPool;
use crate::models::audit_log::{ActionType, AuditLogEntry};
use crate::models::session::{Session, SessionStatus};
use crate::repositories::{audit_log as log_repo, session as session_repo};
use crate::services::gate::AuditGate;
use crate::types::{AuditLogId, SessionId, UserId};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("{action} entries cannot carry old values")]
    OldValuesNotAllowed { action: &'static str },
    #[error("{action} entries cannot carry new values")]
    NewValuesNotAllowed { action: &'static str },
    #[error("old and new values must be field maps")]
    ValuesNotAnObject,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CaptureRequest {
    #[schema(value_type = String)]
    pub user_id: UserId,
    /// Transport identifier of the session the change happened under.
    pub session_sid: Option<String>,
    pub model_name: String,
    pub record_id: String,
    pub record_label: Option<String>,
    pub action_type: ActionType,
    pub method: Option<String>,
    /// Request origin, e.g. "web" or "import". Bulk origins are not audited.
    pub origin: Option<String>,
    /// Changed fields before the mutation; only the fields that changed.
    pub old_values: Option<Value>,
    /// Changed fields after the mutation; only the fields that changed.
    pub new_values: Option<Value>,
}

#[derive(Clone)]
pub struct CaptureService {
    pool: DbPool,
    gate: AuditGate,
}

impl CaptureService {
    pub fn new(pool: DbPool, gate: AuditGate) -> Self {
        Self { pool, gate }
    }

    /// Captures one change. Returns `None` when the gate declines the event;
    /// that is a normal outcome, not an error.
    pub async fn capture(
        &self,
        request: CaptureRequest,
    ) -> Result<Option<AuditLogEntry>, CaptureError> {
        validate_values(&request)?;

        let audited = self
            .gate
            .should_audit(
                &request.model_name,
                request.action_type,
                request.user_id,
                request.origin.as_deref(),
            )
            .await;
        if !audited {
            tracing::debug!(
                model = %request.model_name,
                action = request.action_type.as_str(),
                "capture declined by gate"
            );
            return Ok(None);
        }

        let session_id = self
            .resolve_session(request.user_id, request.session_sid.as_deref())
            .await?;

        let entry = AuditLogEntry {
            id: AuditLogId::new(),
            user_id: request.user_id,
            session_id: Some(session_id),
            model_name: request.model_name,
            record_id: request.record_id,
            record_label: request.record_label,
            action_type: request.action_type,
            action_date: Utc::now(),
            method: request.method,
            old_values: request.old_values.map(Json),
            new_values: request.new_values.map(Json),
        };
        log_repo::insert_log_entry(&self.pool, &entry).await?;

        tracing::debug!(
            entry_id = %entry.id,
            session_id = %session_id,
            model = %entry.model_name,
            "change captured"
        );

        Ok(Some(entry))
    }

    /// Finds the session a change belongs to, widening the search when the
    /// exact identifier has no active row. A change must never be dropped for
    /// lack of a session, so the last resort creates one.
    async fn resolve_session(
        &self,
        user_id: UserId,
        session_sid: Option<&str>,
    ) -> Result<SessionId, sqlx::Error> {
        let now = Utc::now();

        if let Some(sid) = session_sid {
            if let Some(session) = session_repo::find_active_by_sid(&self.pool, sid).await? {
                session_repo::touch_activity(&self.pool, sid, now).await?;
                return Ok(session.id);
            }
        }

        if let Some(session) = session_repo::find_latest_active_for_user(&self.pool, user_id).await?
        {
            // The transport rotated its identifier under us; follow it.
            if let Some(sid) = session_sid {
                session_repo::update_session_sid(&self.pool, session.id, sid, now).await?;
            }
            return Ok(session.id);
        }

        let mut session = Session::new(
            user_id,
            session_sid
                .map(str::to_string)
                .unwrap_or_else(|| format!("capture-{}", SessionId::new())),
            now,
        );
        session.status = SessionStatus::Active;
        session.error_message = Some("emergency session created during capture".to_string());
        session_repo::insert_session(&self.pool, &session).await?;

        tracing::warn!(
            user_id = %user_id,
            session_id = %session.id,
            "capture arrived without any active session"
        );

        Ok(session.id)
    }
}

fn validate_values(request: &CaptureRequest) -> Result<(), CaptureError> {
    for values in [request.old_values.as_ref(), request.new_values.as_ref()]
        .into_iter()
        .flatten()
    {
        if !values.is_object() {
            return Err(CaptureError::ValuesNotAnObject);
        }
    }

    if request.old_values.is_some() && !request.action_type.allows_old_values() {
        return Err(CaptureError::OldValuesNotAllowed {
            action: request.action_type.as_str(),
        });
    }
    if request.new_values.is_some() && !request.action_type.allows_new_values() {
        return Err(CaptureError::NewValuesNotAllowed {
            action: request.action_type.as_str(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(action: ActionType, old: Option<Value>, new: Option<Value>) -> CaptureRequest {
        CaptureRequest {
            user_id: UserId::new(),
            session_sid: Some("sid-1".to_string()),
            model_name: "res.partner".to_string(),
            record_id: "1".to_string(),
            record_label: None,
            action_type: action,
            method: None,
            origin: None,
            old_values: old,
            new_values: new,
        }
    }

    #[test]
    fn create_rejects_old_values() {
        let err = validate_values(&request(
            ActionType::Create,
            Some(json!({"name": "a"})),
            Some(json!({"name": "b"})),
        ))
        .unwrap_err();
        assert!(matches!(err, CaptureError::OldValuesNotAllowed { .. }));
    }

    #[test]
    fn unlink_rejects_new_values() {
        let err = validate_values(&request(
            ActionType::Unlink,
            Some(json!({"name": "a"})),
            Some(json!({"name": "b"})),
        ))
        .unwrap_err();
        assert!(matches!(err, CaptureError::NewValuesNotAllowed { .. }));
    }

    #[test]
    fn write_accepts_both_sides() {
        assert!(validate_values(&request(
            ActionType::Write,
            Some(json!({"name": "a"})),
            Some(json!({"name": "b"})),
        ))
        .is_ok());
    }

    #[test]
    fn read_accepts_no_values() {
        assert!(validate_values(&request(ActionType::Read, None, None)).is_ok());
    }

    #[test]
    fn values_must_be_objects() {
        let err = validate_values(&request(
            ActionType::Write,
            None,
            Some(json!(["not", "a", "map"])),
        ))
        .unwrap_err();
        assert!(matches!(err, CaptureError::ValuesNotAnObject));
    }
}
