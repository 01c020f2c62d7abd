use async_trait::async_trait;

use super::{Command, CommandHandler};
use crate::error::FlowError;
use crate::models::{Message, Role};
use crate::service::RunContext;

fn mismatch(handler: &str, command: &Command<'_>) -> FlowError {
    FlowError::Internal(format!(
        "{} handler received a {} command",
        handler,
        command.name()
    ))
}

/// Appends the instruction as a System message and acknowledges with
/// `STARTED`. Visual chats get nothing.
pub struct StartCommandHandler;

#[async_trait]
impl CommandHandler for StartCommandHandler {
    async fn handle(&self, command: Command<'_>, _run: &RunContext) -> Result<Option<Message>, FlowError> {
        let (chat, instruction) = match command {
            Command::Start { chat, instruction } => (chat, instruction),
            other => return Err(mismatch("START", &other)),
        };
        if chat.visual {
            return Ok(None);
        }
        chat.push(Message::system(instruction));
        Ok(Some(Message::system("STARTED")))
    }
}

pub struct AnswerCommandHandler;

#[async_trait]
impl CommandHandler for AnswerCommandHandler {
    async fn handle(&self, command: Command<'_>, run: &RunContext) -> Result<Option<Message>, FlowError> {
        let (chat, memory) = match command {
            Command::Answer { chat, memory } => (chat, memory),
            other => return Err(mismatch("ANSWER", &other)),
        };
        let backends = &run.engine().backends;

        let result = if chat.visual {
            backends.image()?.send(chat).await?
        } else {
            let llm = backends.llm(chat.backend);
            match memory {
                Some(memory) => llm.ask_memory(chat, memory).await?,
                None => llm.send(chat).await?,
            }
        };
        Ok(Some(result.message))
    }
}

pub struct FetchCommandHandler;

#[async_trait]
impl CommandHandler for FetchCommandHandler {
    async fn handle(&self, command: Command<'_>, run: &RunContext) -> Result<Option<Message>, FlowError> {
        let (source, filter, as_system) = match command {
            Command::FetchData {
                source,
                filter,
                as_system,
            } => (source, filter, as_system),
            other => return Err(mismatch("FETCH_DATA", &other)),
        };

        let data = run.engine().sources.fetch(source, filter).await?;
        let role = if as_system { Role::System } else { Role::User };
        let mut message = Message::new(role, data.content).internal();
        message.properties.extend(data.properties);
        Ok(Some(message))
    }
}

/// Hands the message to the target agent and returns that agent's final
/// message as an internal System message.
pub struct RedirectCommandHandler;

#[async_trait]
impl CommandHandler for RedirectCommandHandler {
    async fn handle(&self, command: Command<'_>, run: &RunContext) -> Result<Option<Message>, FlowError> {
        let (message, target, filter) = match command {
            Command::Redirect {
                message,
                target,
                filter,
            } => (message, target, filter),
            other => return Err(mismatch("REDIRECT", &other)),
        };
        let reply = run
            .service()
            .run_redirect(target, message, filter, run)
            .await?;
        Ok(Some(reply))
    }
}

pub struct McpCommandHandler;

#[async_trait]
impl CommandHandler for McpCommandHandler {
    async fn handle(&self, command: Command<'_>, run: &RunContext) -> Result<Option<Message>, FlowError> {
        let (chat, config) = match command {
            Command::Mcp { chat, config } => (chat, config),
            other => return Err(mismatch("MCP", &other)),
        };
        let bridge = run.engine().backends.bridge()?;
        tracing::info!("[Mcp] Prompting '{}' via {}", config.name, config.transport);
        let reply = bridge.prompt(config, &chat.messages).await?;
        Ok(Some(reply))
    }
}
