//! Step grammar, the step handler table and the per-message pipeline.

pub mod grammar;
mod handlers;
mod pipeline;

pub use grammar::{Grounding, MergeMode, OutputMode, Step, StepBuilder, StepKind};
pub use handlers::{
    AnswerStepHandler, BecomeStepHandler, CleanupStepHandler, FetchDataStepHandler,
    McpStepHandler, RedirectStepHandler, StartStepHandler,
};
pub use pipeline::run_pipeline;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::FlowError;
use crate::models::{Agent, Chat, Message};
use crate::service::RunContext;

/// Mutable state a step operates on.
pub struct StepContext<'a> {
    pub agent: &'a mut Agent,
    pub chat: &'a mut Chat,
    /// Message a `REDIRECT` step forwards: the latest output of a non-redirect step.
    pub redirect_message: Option<&'a Message>,
    pub run: &'a RunContext,
}

#[derive(Debug, Default)]
pub struct StepOutcome {
    /// Becomes the next `redirect_message` unless the step was a redirect.
    pub message: Option<Message>,
}

impl StepOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with(message: Message) -> Self {
        Self {
            message: Some(message),
        }
    }
}

#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(&self, step: &Step, ctx: &mut StepContext<'_>) -> Result<StepOutcome, FlowError>;
}

/// Maps dispatch keys (`ANSWER`, `FETCH_DATA*`, ...) to step handlers.
#[derive(Clone, Default)]
pub struct StepRegistry {
    handlers: HashMap<&'static str, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut registry = Self::new();
        let fetch: Arc<dyn StepHandler> = Arc::new(FetchDataStepHandler);
        let become_: Arc<dyn StepHandler> = Arc::new(BecomeStepHandler);
        registry.register(grammar::START, Arc::new(StartStepHandler));
        registry.register(grammar::ANSWER, Arc::new(AnswerStepHandler));
        registry.register(grammar::BECOME, become_.clone());
        registry.register(grammar::BECOME_ONCE, become_);
        registry.register(grammar::FETCH_DATA, fetch.clone());
        registry.register(grammar::FETCH_DATA_ONCE, fetch);
        registry.register(grammar::REDIRECT, Arc::new(RedirectStepHandler));
        registry.register(grammar::MCP, Arc::new(McpStepHandler));
        registry.register(grammar::CLEANUP, Arc::new(CleanupStepHandler));
        registry
    }

    pub fn register(&mut self, key: &'static str, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(key, handler);
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn StepHandler>, FlowError> {
        self.handlers
            .get(key)
            .cloned()
            .ok_or_else(|| FlowError::HandlerNotFound(key.to_string()))
    }
}
