use chrono::Duration as ChronoDuration;
use serde_json::json;
use sessiontrail_backend::{
    models::audit_log::ActionType,
    repositories::{
        audit_config as config_repo,
        audit_log::{self as log_repo, LogPurgeFilters},
        session as session_repo,
    },
    services::capture::{CaptureRequest, CaptureService},
    services::describe,
    services::gate::AuditGate,
    services::schema::{FieldKind, FieldSchema, ModelSchema, SchemaCatalog},
    types::UserId,
};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

#[path = "support/mod.rs"]
mod support;

async fn integration_guard() -> tokio::sync::MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD.get_or_init(|| Mutex::new(())).lock().await
}

fn capture_service(pool: &PgPool) -> (CaptureService, AuditGate) {
    let pool = Arc::new(pool.clone());
    let gate = AuditGate::new(pool.clone());
    (CaptureService::new(pool, gate.clone()), gate)
}

async fn allow_model(pool: &PgPool, model_name: &str) {
    let config = config_repo::fetch_active_config(pool)
        .await
        .expect("fetch config")
        .expect("seeded config");
    config_repo::add_allowed_model(pool, config.id, model_name)
        .await
        .expect("allow model");
}

fn write_request(user_id: UserId, sid: Option<&str>) -> CaptureRequest {
    CaptureRequest {
        user_id,
        session_sid: sid.map(str::to_string),
        model_name: "res.partner".to_string(),
        record_id: "42".to_string(),
        record_label: Some("Acme Corp".to_string()),
        action_type: ActionType::Write,
        method: Some("write".to_string()),
        origin: Some("web".to_string()),
        old_values: Some(json!({"phone": "111"})),
        new_values: Some(json!({"phone": "222"})),
    }
}

#[tokio::test]
async fn capture_attributes_entry_to_the_active_session() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    support::reset_tables(&pool).await;
    allow_model(&pool, "res.partner").await;

    let user = UserId::new();
    let session = support::seed_active_session(
        &pool,
        user,
        "sid-capture",
        ChronoDuration::minutes(10),
        ChronoDuration::minutes(5),
    )
    .await;

    let (service, _gate) = capture_service(&pool);
    let entry = service
        .capture(write_request(user, Some("sid-capture")))
        .await
        .expect("capture")
        .expect("entry recorded");
    assert_eq!(entry.session_id, Some(session.id));
    assert_eq!(entry.model_name, "res.partner");

    let stored = log_repo::fetch_log_entry(&pool, entry.id)
        .await
        .expect("fetch entry")
        .expect("exists");
    assert_eq!(stored.record_id, "42");
    assert_eq!(stored.action_type, ActionType::Write);

    // Capture refreshes the session's activity clock.
    let touched = session_repo::fetch_session(&pool, session.id)
        .await
        .expect("fetch session")
        .expect("exists");
    assert!(touched.last_activity > session.last_activity);
}

#[tokio::test]
async fn gate_declines_until_allow_list_change_is_invalidated() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    support::reset_tables(&pool).await;

    let user = UserId::new();
    support::seed_active_session(
        &pool,
        user,
        "sid-gated",
        ChronoDuration::minutes(10),
        ChronoDuration::minutes(1),
    )
    .await;

    let (service, gate) = capture_service(&pool);

    // res.partner is not on the allow-list yet.
    let declined = service
        .capture(write_request(user, Some("sid-gated")))
        .await
        .expect("capture");
    assert!(declined.is_none());

    allow_model(&pool, "res.partner").await;

    // The gate still serves its cached snapshot.
    let still_declined = service
        .capture(write_request(user, Some("sid-gated")))
        .await
        .expect("capture");
    assert!(still_declined.is_none());

    gate.invalidate().await;
    let captured = service
        .capture(write_request(user, Some("sid-gated")))
        .await
        .expect("capture");
    assert!(captured.is_some());
}

#[tokio::test]
async fn bulk_origins_are_never_captured() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    support::reset_tables(&pool).await;
    allow_model(&pool, "res.partner").await;

    let user = UserId::new();
    support::seed_active_session(
        &pool,
        user,
        "sid-bulk",
        ChronoDuration::minutes(10),
        ChronoDuration::minutes(1),
    )
    .await;

    let (service, _gate) = capture_service(&pool);
    let mut request = write_request(user, Some("sid-bulk"));
    request.origin = Some("import".to_string());
    let declined = service.capture(request).await.expect("capture");
    assert!(declined.is_none());
}

#[tokio::test]
async fn capture_follows_rotated_session_identifier() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    support::reset_tables(&pool).await;
    allow_model(&pool, "res.partner").await;

    let user = UserId::new();
    let session = support::seed_active_session(
        &pool,
        user,
        "sid-before-rotation",
        ChronoDuration::minutes(10),
        ChronoDuration::minutes(1),
    )
    .await;

    let (service, _gate) = capture_service(&pool);
    let entry = service
        .capture(write_request(user, Some("sid-after-rotation")))
        .await
        .expect("capture")
        .expect("entry recorded");
    assert_eq!(entry.session_id, Some(session.id));

    let updated = session_repo::fetch_session(&pool, session.id)
        .await
        .expect("fetch")
        .expect("exists");
    assert_eq!(updated.session_sid, "sid-after-rotation");
}

#[tokio::test]
async fn capture_without_any_session_creates_one() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    support::reset_tables(&pool).await;
    allow_model(&pool, "res.partner").await;

    let user = UserId::new();
    let (service, _gate) = capture_service(&pool);
    let entry = service
        .capture(write_request(user, None))
        .await
        .expect("capture")
        .expect("entry recorded");

    let session_id = entry.session_id.expect("attributed session");
    let session = session_repo::fetch_session(&pool, session_id)
        .await
        .expect("fetch")
        .expect("exists");
    assert!(session.is_active());
    assert_eq!(session.user_id, user);
    assert!(session.error_message.is_some());
}

#[tokio::test]
async fn captured_entry_renders_human_readable() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    support::reset_tables(&pool).await;
    allow_model(&pool, "res.partner").await;

    let user = UserId::new();
    support::seed_active_session(
        &pool,
        user,
        "sid-describe",
        ChronoDuration::minutes(10),
        ChronoDuration::minutes(1),
    )
    .await;

    let (service, _gate) = capture_service(&pool);
    let entry = service
        .capture(write_request(user, Some("sid-describe")))
        .await
        .expect("capture")
        .expect("entry recorded");

    let mut catalog = SchemaCatalog::new();
    catalog.register(
        "res.partner",
        ModelSchema {
            fields: HashMap::from([(
                "phone".to_string(),
                FieldSchema {
                    label: "Phone".to_string(),
                    kind: FieldKind::Char,
                },
            )]),
        },
    );

    let described = describe::describe(&entry, &catalog);
    assert_eq!(described.old_readable.as_deref(), Some("Phone: 111"));
    assert_eq!(described.new_readable.as_deref(), Some("Phone: 222"));
    assert_eq!(described.summary, "Updated Acme Corp (Phone)");
}

#[tokio::test]
async fn purge_deletes_only_matching_entries() {
    let _guard = integration_guard().await;
    let pool = support::test_pool().await;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    support::reset_tables(&pool).await;
    allow_model(&pool, "res.partner").await;
    allow_model(&pool, "sale.order").await;

    let user = UserId::new();
    support::seed_active_session(
        &pool,
        user,
        "sid-purge",
        ChronoDuration::minutes(10),
        ChronoDuration::minutes(1),
    )
    .await;

    let (service, _gate) = capture_service(&pool);
    service
        .capture(write_request(user, Some("sid-purge")))
        .await
        .expect("capture")
        .expect("entry recorded");
    let mut order_request = write_request(user, Some("sid-purge"));
    order_request.model_name = "sale.order".to_string();
    let kept = service
        .capture(order_request)
        .await
        .expect("capture")
        .expect("entry recorded");

    let purged = log_repo::purge_logs(
        &pool,
        &LogPurgeFilters {
            model_name: Some("res.partner".to_string()),
            ..LogPurgeFilters::default()
        },
    )
    .await
    .expect("purge");
    assert_eq!(purged, 1);

    assert!(log_repo::fetch_log_entry(&pool, kept.id)
        .await
        .expect("fetch")
        .is_some());
}
