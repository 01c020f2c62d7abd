//! Engine wiring and the per-request run context.

mod agent_service;

pub use agent_service::AgentService;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendRegistry, HttpLlmBackend, LlmBackend};
use crate::commands::CommandDispatcher;
use crate::config::EngineConfig;
use crate::db::Database;
use crate::notify::{ProgressNotifier, TracingNotifier};
use crate::sources::DataSourceProvider;
use crate::steps::StepRegistry;
use crate::store::{AgentStore, ChatStore};

/// Everything a pipeline needs, built once at startup and shared.
pub struct Engine {
    pub agents: AgentStore,
    pub chats: ChatStore,
    pub backends: BackendRegistry,
    pub sources: DataSourceProvider,
    pub commands: CommandDispatcher,
    pub steps: StepRegistry,
    pub notifier: Arc<dyn ProgressNotifier>,
    pub knowledge_root: PathBuf,
    pub max_redirect_depth: usize,
    pub redirect_lock_timeout: Duration,
}

impl Engine {
    pub fn builder(db: Database) -> EngineBuilder {
        EngineBuilder::new(db)
    }
}

pub struct EngineBuilder {
    db: Database,
    config: EngineConfig,
    backends: Option<BackendRegistry>,
    sources: Option<DataSourceProvider>,
    commands: CommandDispatcher,
    steps: StepRegistry,
    notifier: Arc<dyn ProgressNotifier>,
}

impl EngineBuilder {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            config: EngineConfig::default(),
            backends: None,
            sources: None,
            commands: CommandDispatcher::standard(),
            steps: StepRegistry::standard(),
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Shorthand for a registry with a single default text backend.
    pub fn llm(self, llm: Arc<dyn LlmBackend>) -> Self {
        self.backends(BackendRegistry::new(llm))
    }

    pub fn sources(mut self, sources: DataSourceProvider) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn commands(mut self, commands: CommandDispatcher) -> Self {
        self.commands = commands;
        self
    }

    pub fn steps(mut self, steps: StepRegistry) -> Self {
        self.steps = steps;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn ProgressNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn build(self) -> Arc<Engine> {
        let timeout = Duration::from_secs(self.config.http_timeout_secs);
        let backends = self.backends.unwrap_or_else(|| {
            BackendRegistry::new(Arc::new(HttpLlmBackend::new(
                self.config.backend.clone(),
                timeout,
            )))
        });
        Arc::new(Engine {
            agents: AgentStore::new(self.db.clone()),
            chats: ChatStore::new(self.db),
            backends,
            sources: self
                .sources
                .unwrap_or_else(|| DataSourceProvider::new(timeout)),
            commands: self.commands,
            steps: self.steps,
            notifier: self.notifier,
            knowledge_root: self.config.knowledge_root(),
            max_redirect_depth: self.config.max_redirect_depth,
            redirect_lock_timeout: Duration::from_millis(self.config.redirect_lock_timeout_ms),
        })
    }
}

/// Per-request state threaded through every step and redirect.
pub struct RunContext {
    service: AgentService,
    call_path: Vec<String>,
    cancel: CancellationToken,
}

impl RunContext {
    pub(crate) fn root(service: AgentService, agent_id: &str, cancel: CancellationToken) -> Self {
        Self {
            service,
            call_path: vec![agent_id.to_string()],
            cancel,
        }
    }

    pub(crate) fn child(&self, agent_id: &str) -> Self {
        let mut call_path = self.call_path.clone();
        call_path.push(agent_id.to_string());
        Self {
            service: self.service.clone(),
            call_path,
            cancel: self.cancel.clone(),
        }
    }

    pub fn engine(&self) -> &Engine {
        self.service.engine()
    }

    pub fn service(&self) -> &AgentService {
        &self.service
    }

    /// Agent ids from the request's entry agent down to the current one.
    pub fn call_path(&self) -> &[String] {
        &self.call_path
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
