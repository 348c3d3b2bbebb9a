//! Cached audit gating.
//!
//! Every capture consults the gate, so the configuration and its allow-lists
//! are loaded once and held in memory until `invalidate` is called. The gate
//! never surfaces errors to callers: if the configuration cannot be loaded the
//! answer is "do not audit".

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::connection::DbPool;
use crate::models::audit_config::AuditConfig;
use crate::models::audit_log::ActionType;
use crate::repositories::audit_config;
use crate::types::UserId;

/// Models that are never audited, regardless of configuration. Auditing the
/// audit trail itself would recurse, and framework bookkeeping tables only
/// produce noise.
const SKIPPED_MODELS: &[&str] = &[
    "ir.logging",
    "ir.attachment",
    "ir.cron",
    "ir.sequence",
    "bus.bus",
    "bus.presence",
    "mail.message",
    "mail.tracking.value",
];

/// Request origins that indicate bulk machinery rather than user activity.
const BULK_ORIGINS: &[&str] = &["import", "install_mode", "migration"];

/// Reserved accounts used by the platform itself.
const SYSTEM_USER_IDS: &[&str] = &[
    "00000000-0000-0000-0000-000000000001",
    "00000000-0000-0000-0000-000000000002",
];

#[derive(Debug, Clone)]
pub struct GateSnapshot {
    pub config: AuditConfig,
    pub allowed_users: HashSet<UserId>,
    pub allowed_models: HashSet<String>,
}

#[derive(Clone)]
pub struct AuditGate {
    pool: DbPool,
    snapshot: Arc<RwLock<Option<Arc<GateSnapshot>>>>,
}

impl AuditGate {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    /// Decides whether a change should be captured. Infallible: a missing or
    /// unloadable configuration means nothing is audited.
    pub async fn should_audit(
        &self,
        model_name: &str,
        action: ActionType,
        user_id: UserId,
        origin: Option<&str>,
    ) -> bool {
        match self.snapshot_or_load().await {
            Some(snapshot) => evaluate(&snapshot, model_name, action, user_id, origin),
            None => false,
        }
    }

    /// The cached configuration, falling back to defaults when no row exists
    /// so timing thresholds stay usable for session maintenance.
    pub async fn settings(&self) -> AuditConfig {
        match self.snapshot_or_load().await {
            Some(snapshot) => snapshot.config.clone(),
            None => AuditConfig::default(),
        }
    }

    /// Drops the cached snapshot. The next query reloads from the database.
    pub async fn invalidate(&self) {
        let mut guard = self.snapshot.write().await;
        *guard = None;
        tracing::debug!("audit gate cache invalidated");
    }

    async fn snapshot_or_load(&self) -> Option<Arc<GateSnapshot>> {
        {
            let guard = self.snapshot.read().await;
            if let Some(snapshot) = guard.as_ref() {
                return Some(snapshot.clone());
            }
        }

        let mut guard = self.snapshot.write().await;
        // Another task may have loaded while we waited for the write lock.
        if let Some(snapshot) = guard.as_ref() {
            return Some(snapshot.clone());
        }

        match load_snapshot(&self.pool).await {
            Ok(Some(snapshot)) => {
                let snapshot = Arc::new(snapshot);
                *guard = Some(snapshot.clone());
                Some(snapshot)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load audit configuration; auditing disabled");
                None
            }
        }
    }
}

async fn load_snapshot(pool: &DbPool) -> Result<Option<GateSnapshot>, sqlx::Error> {
    let Some(config) = audit_config::fetch_active_config(pool).await? else {
        return Ok(None);
    };
    let allowed_users = audit_config::list_allowed_users(pool, config.id)
        .await?
        .into_iter()
        .collect();
    let allowed_models = audit_config::list_allowed_models(pool, config.id)
        .await?
        .into_iter()
        .collect();
    Ok(Some(GateSnapshot {
        config,
        allowed_users,
        allowed_models,
    }))
}

/// Pure gating decision over a loaded snapshot.
pub fn evaluate(
    snapshot: &GateSnapshot,
    model_name: &str,
    action: ActionType,
    user_id: UserId,
    origin: Option<&str>,
) -> bool {
    if !snapshot.config.active || !snapshot.config.enable_auditing {
        return false;
    }

    // The audit trail never audits itself.
    if model_name.starts_with("audit.") || model_name.starts_with("audit_") {
        return false;
    }
    if SKIPPED_MODELS.contains(&model_name) {
        return false;
    }

    if let Some(origin) = origin {
        if BULK_ORIGINS.contains(&origin) {
            return false;
        }
    }

    let user_str = user_id.to_string();
    if SYSTEM_USER_IDS.contains(&user_str.as_str()) {
        return false;
    }

    let action_enabled = match action {
        ActionType::Read => snapshot.config.log_read,
        ActionType::Write => snapshot.config.log_write,
        ActionType::Create => snapshot.config.log_create,
        ActionType::Unlink => snapshot.config.log_unlink,
    };
    if !action_enabled {
        return false;
    }

    if !snapshot.config.all_users && !snapshot.allowed_users.contains(&user_id) {
        return false;
    }

    if !snapshot.config.all_models && !snapshot.allowed_models.contains(model_name) {
        return false;
    }

    true
}
