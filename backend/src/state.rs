use std::sync::Arc;

use crate::{
    config::Config, db::connection::DbPool, services::gate::AuditGate,
    services::schema::SchemaCatalog,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
    pub gate: AuditGate,
    pub catalog: Arc<SchemaCatalog>,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config, gate: AuditGate, catalog: Arc<SchemaCatalog>) -> Self {
        Self {
            pool,
            config,
            gate,
            catalog,
        }
    }
}
