use axum::{
    http::Method,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessiontrail_backend::{
    config::Config,
    db::connection::create_pool,
    handlers,
    middleware::{activity, request_id},
    services::{gate::AuditGate, schema::SchemaCatalog},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sessiontrail_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        bind_addr = %config.bind_addr,
        sweep_batch_size = config.sweep_batch_size,
        geoip_enabled = config.geoip_enabled,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&*pool).await?;

    // Field metadata for readable change rendering, when provided
    let catalog = match config.schema_catalog_path.as_deref() {
        Some(path) => {
            let catalog = SchemaCatalog::load_from_file(path)?;
            tracing::info!(path, "Loaded schema catalog");
            catalog
        }
        None => SchemaCatalog::new(),
    };

    let gate = AuditGate::new(pool.clone());
    let state = AppState::new(pool, config.clone(), gate, Arc::new(catalog));

    let session_routes = Router::new()
        .route("/api/sessions/login", post(handlers::sessions::login))
        .route("/api/sessions/logout", post(handlers::sessions::logout))
        .route(
            "/api/sessions/heartbeat",
            post(handlers::sessions::heartbeat),
        )
        .route(
            "/api/sessions/login-failed",
            post(handlers::sessions::login_failed),
        )
        .route("/api/sessions/{id}", get(handlers::stats::get_session))
        .route(
            "/api/sessions/{id}/logs",
            get(handlers::stats::session_logs),
        )
        .route(
            "/api/users/{id}/sessions",
            get(handlers::stats::user_sessions),
        );

    let audit_routes = Router::new()
        .route("/api/audit/capture", post(handlers::capture::capture))
        .route(
            "/api/audit/should-audit",
            get(handlers::capture::should_audit),
        )
        .route(
            "/api/audit/logs/{id}/describe",
            get(handlers::capture::describe_log),
        )
        .route("/api/audit/logs", delete(handlers::config::purge_logs))
        .route(
            "/api/audit/config",
            get(handlers::config::get_config).put(handlers::config::update_config),
        )
        .route(
            "/api/audit/config/users/{id}",
            post(handlers::config::add_allowed_user)
                .delete(handlers::config::remove_allowed_user),
        )
        .route(
            "/api/audit/config/models/{name}",
            post(handlers::config::add_allowed_model)
                .delete(handlers::config::remove_allowed_model),
        );

    let stats_routes = Router::new()
        .route("/api/stats/sessions", get(handlers::stats::session_stats))
        .route("/api/stats/actions", get(handlers::stats::action_stats))
        .route("/api/stats/models", get(handlers::stats::model_stats))
        .route("/api/stats/users", get(handlers::stats::user_stats))
        .route(
            "/api/debug/login-plan",
            get(handlers::stats::debug_login_plan),
        )
        .route("/api/admin/sweep", post(handlers::stats::run_sweep));

    // Compose app with shared layers (CORS/Trace) and shared state
    let app = Router::new()
        .merge(session_routes)
        .merge(audit_routes)
        .merge(stats_routes)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            activity::touch_activity,
        ))
        .layer(axum_middleware::from_fn(request_id::request_id))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers(Any)
                        .max_age(std::time::Duration::from_secs(24 * 60 * 60)),
                ),
        )
        .with_state(state);

    // Start server
    let addr: std::net::SocketAddr = config.bind_addr.parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
