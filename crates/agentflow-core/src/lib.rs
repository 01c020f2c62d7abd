//! agentflow core: agents, step pipelines and flows.
//!
//! An agent owns an instruction, an optional data source and an ordered list
//! of steps (`START`, `ANSWER+USE_MEMORY`, `REDIRECT+billing+AS_Output`, ...).
//! Every message sent to an agent runs those steps in order against its chat.
//! `REDIRECT` hands the current message to another agent's pipeline and folds
//! the result back, which is how flows are composed.
//!
//! Model providers, image generation and protocol bridges are traits in
//! [`backend`]; the crate ships an HTTP text backend and leaves the rest to
//! the embedding application.

pub mod backend;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod flow;
pub mod knowledge;
pub mod models;
pub mod notify;
pub mod service;
pub mod sources;
pub mod state;
pub mod steps;
pub mod store;

// Convenience re-exports
pub use config::EngineConfig;
pub use db::Database;
pub use error::{ErrorKind, FlowError};
pub use flow::{FlowBuilder, FlowDefinition, FlowService};
pub use service::{AgentService, Engine, RunContext};
pub use state::{AppState, AppStateInner};
pub use steps::{Step, StepBuilder};
