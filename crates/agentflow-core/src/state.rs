//! Shared application state for front ends (CLI, servers).

use std::sync::Arc;

use crate::backend::BackendRegistry;
use crate::config::EngineConfig;
use crate::db::Database;
use crate::flow::FlowService;
use crate::service::{AgentService, Engine};
use crate::store::FlowStore;

pub struct AppStateInner {
    pub db: Database,
    pub config: EngineConfig,
    pub engine: Arc<Engine>,
    pub agent_service: AgentService,
    pub flow_service: FlowService,
    pub flow_store: FlowStore,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// Wire the engine with the HTTP backend described by `config`.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Self::with_backends(db, config, None)
    }

    /// Same as [`AppStateInner::new`] with caller-provided backends.
    pub fn with_backends(
        db: Database,
        config: EngineConfig,
        backends: Option<BackendRegistry>,
    ) -> Self {
        let mut builder = Engine::builder(db.clone()).config(config.clone());
        if let Some(backends) = backends {
            builder = builder.backends(backends);
        }
        let engine = builder.build();
        let agent_service = AgentService::new(engine.clone());
        let flow_store = FlowStore::new(db.clone());
        Self {
            flow_service: FlowService::new(agent_service.clone(), flow_store.clone()),
            agent_service,
            flow_store,
            engine,
            config,
            db,
        }
    }
}
