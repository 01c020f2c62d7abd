//! Typed commands and the dispatcher that routes them to handlers.
//!
//! Step handlers build a [`Command`] from the current chat and step
//! arguments and hand it to [`CommandDispatcher::call`]. Each handler
//! returns at most one message for the step to fold back into the chat.

mod handlers;

pub use handlers::{
    AnswerCommandHandler, FetchCommandHandler, McpCommandHandler, RedirectCommandHandler,
    StartCommandHandler,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::FlowError;
use crate::models::{AgentSource, Chat, McpConfig, Message};
use crate::service::RunContext;

pub const START: &str = "START";
pub const ANSWER: &str = "ANSWER";
pub const FETCH_DATA: &str = "FETCH_DATA";
pub const REDIRECT: &str = "REDIRECT";
pub const MCP: &str = "MCP";

pub enum Command<'a> {
    /// Seed the chat with the agent's instruction.
    Start {
        chat: &'a mut Chat,
        instruction: &'a str,
    },
    /// Ask the model. `memory` switches to grounded answering.
    Answer {
        chat: &'a Chat,
        memory: Option<&'a [String]>,
    },
    FetchData {
        source: &'a AgentSource,
        filter: &'a str,
        as_system: bool,
    },
    /// Run another agent's pipeline on `message`.
    Redirect {
        message: &'a Message,
        target: &'a str,
        filter: Option<&'a str>,
    },
    Mcp {
        chat: &'a Chat,
        config: &'a McpConfig,
    },
}

impl Command<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => START,
            Command::Answer { .. } => ANSWER,
            Command::FetchData { .. } => FETCH_DATA,
            Command::Redirect { .. } => REDIRECT,
            Command::Mcp { .. } => MCP,
        }
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: Command<'_>, run: &RunContext) -> Result<Option<Message>, FlowError>;
}

#[derive(Clone, Default)]
pub struct CommandDispatcher {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with the built-in handlers registered.
    pub fn standard() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(START, Arc::new(StartCommandHandler));
        dispatcher.register(ANSWER, Arc::new(AnswerCommandHandler));
        dispatcher.register(FETCH_DATA, Arc::new(FetchCommandHandler));
        dispatcher.register(REDIRECT, Arc::new(RedirectCommandHandler));
        dispatcher.register(MCP, Arc::new(McpCommandHandler));
        dispatcher
    }

    pub fn register(&mut self, name: &'static str, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(name, handler);
    }

    pub fn unregister(&mut self, name: &str) {
        self.handlers.remove(name);
    }

    /// Route a command to its handler. An unregistered name is fatal for the
    /// running pipeline.
    pub async fn call(&self, command: Command<'_>, run: &RunContext) -> Result<Option<Message>, FlowError> {
        let name = command.name();
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| FlowError::HandlerNotFound(name.to_string()))?;
        handler.handle(command, run).await
    }
}
