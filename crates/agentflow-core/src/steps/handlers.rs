use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

use super::{Grounding, MergeMode, OutputMode, Step, StepContext, StepHandler, StepKind, StepOutcome};
use crate::commands::Command;
use crate::error::FlowError;
use crate::knowledge::Knowledge;
use crate::models::{props, Chat, Message, Role, DEFAULT_BEHAVIOUR, FILTER_PLACEHOLDER};
use crate::notify::ProgressUpdate;

fn notify(ctx: &StepContext<'_>, step: &Step, is_processing: bool) {
    ctx.run.engine().notifier.notify(ProgressUpdate {
        agent_id: ctx.agent.id.clone(),
        is_processing,
        step: step.to_string(),
    });
}

fn unexpected(step: &Step) -> FlowError {
    FlowError::Internal(format!("step '{}' routed to the wrong handler", step))
}

fn no_reply(step: &Step) -> FlowError {
    FlowError::Data(format!("step '{}' produced no message", step))
}

/// `filter:{...}` (optionally with extra colons) in a model reply.
fn extract_filter(content: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"filter:?:?\{(.*?)\}").ok())
        .as_ref()?
        .captures(content)
        .map(|caps| caps[1].to_string())
}

/// Fold a model reply into the chat, picking up any filter it announces.
fn fold_reply(chat: &mut Chat, reply: &Message) {
    if let Some(filter) = extract_filter(&reply.content) {
        chat.set_property_if_absent(props::DATA_FILTER, filter);
    }
    chat.push(reply.clone());
}

pub struct StartStepHandler;

#[async_trait]
impl StepHandler for StartStepHandler {
    async fn handle(&self, step: &Step, ctx: &mut StepContext<'_>) -> Result<StepOutcome, FlowError> {
        if !matches!(step.kind(), StepKind::Start) {
            return Err(unexpected(step));
        }
        if ctx.agent.started {
            return Ok(StepOutcome::none());
        }
        let acknowledgement = ctx
            .run
            .engine()
            .commands
            .call(
                Command::Start {
                    chat: &mut *ctx.chat,
                    instruction: &ctx.agent.context.instruction,
                },
                ctx.run,
            )
            .await?;
        ctx.agent.started = true;
        if let Some(ack) = acknowledgement {
            tracing::debug!("[Step] {} {}", ctx.agent.name, ack.content);
        }
        Ok(StepOutcome::none())
    }
}

pub struct AnswerStepHandler;

#[async_trait]
impl StepHandler for AnswerStepHandler {
    async fn handle(&self, step: &Step, ctx: &mut StepContext<'_>) -> Result<StepOutcome, FlowError> {
        let StepKind::Answer { grounding } = step.kind() else {
            return Err(unexpected(step));
        };
        ctx.chat.ensure_user_message_last();
        notify(ctx, step, true);

        let memory: Option<Vec<String>> = match grounding {
            Grounding::None => None,
            Grounding::Memory => Some(ctx.chat.memory.clone()),
            Grounding::Knowledge => {
                let engine = ctx.run.engine();
                let mut knowledge = Knowledge::load_for(&engine.knowledge_root, &*ctx.agent).await?;
                let query = ctx
                    .chat
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Some(knowledge.fragments_for(&query).await?)
            }
        };

        let reply = ctx
            .run
            .engine()
            .commands
            .call(
                Command::Answer {
                    chat: &*ctx.chat,
                    memory: memory.as_deref(),
                },
                ctx.run,
            )
            .await?
            .ok_or_else(|| no_reply(step))?;

        fold_reply(ctx.chat, &reply);
        Ok(StepOutcome::with(reply))
    }
}

pub struct FetchDataStepHandler;

#[async_trait]
impl StepHandler for FetchDataStepHandler {
    async fn handle(&self, step: &Step, ctx: &mut StepContext<'_>) -> Result<StepOutcome, FlowError> {
        let StepKind::FetchData { as_system, once } = *step.kind() else {
            return Err(unexpected(step));
        };
        if once && ctx.chat.has_property(props::FETCH_ONCE) {
            return Ok(StepOutcome::none());
        }
        let source = ctx.agent.context.source.as_ref().ok_or_else(|| {
            FlowError::Configuration(format!("agent '{}' has no data source", ctx.agent.name))
        })?;
        let filter = ctx.chat.property(props::DATA_FILTER).unwrap_or_default().to_string();

        let message = ctx
            .run
            .engine()
            .commands
            .call(
                Command::FetchData {
                    source,
                    filter: &filter,
                    as_system,
                },
                ctx.run,
            )
            .await?
            .ok_or_else(|| no_reply(step))?;

        ctx.chat.push(message.clone());
        if once {
            ctx.chat.properties.insert(props::FETCH_ONCE.to_string(), "true".into());
        }
        Ok(StepOutcome::with(message))
    }
}

pub struct RedirectStepHandler;

#[async_trait]
impl StepHandler for RedirectStepHandler {
    async fn handle(&self, step: &Step, ctx: &mut StepContext<'_>) -> Result<StepOutcome, FlowError> {
        let StepKind::Redirect {
            target,
            output,
            merge,
        } = step.kind()
        else {
            return Err(unexpected(step));
        };
        notify(ctx, step, false);

        let outgoing = ctx
            .redirect_message
            .ok_or_else(|| FlowError::Data(format!("nothing to redirect for '{}'", step)))?;
        let filter = ctx.chat.property(props::DATA_FILTER).map(str::to_string);

        let mut reply = ctx
            .run
            .engine()
            .commands
            .call(
                Command::Redirect {
                    message: outgoing,
                    target,
                    filter: filter.as_deref(),
                },
                ctx.run,
            )
            .await?
            .ok_or_else(|| no_reply(step))?;

        match output {
            OutputMode::AsFilter => {
                ctx.chat
                    .set_property_if_absent(props::DATA_FILTER, reply.content.clone());
            }
            OutputMode::AsOutput => {
                if *merge == MergeMode::Replace {
                    if let Some(replaced) = ctx.chat.messages.pop() {
                        for (key, value) in replaced.properties {
                            reply.properties.entry(key).or_insert(value);
                        }
                    }
                }
                ctx.chat.push(reply.clone());
            }
        }
        Ok(StepOutcome::with(reply))
    }
}

pub struct BecomeStepHandler;

#[async_trait]
impl StepHandler for BecomeStepHandler {
    async fn handle(&self, step: &Step, ctx: &mut StepContext<'_>) -> Result<StepOutcome, FlowError> {
        let StepKind::Become { role, once } = step.kind() else {
            return Err(unexpected(step));
        };
        if *once && ctx.chat.has_property(props::BECOME_ONCE) {
            return Ok(StepOutcome::none());
        }

        let mut instruction = ctx
            .agent
            .behaviours
            .get(role)
            .cloned()
            .unwrap_or_else(|| ctx.agent.context.instruction.clone());
        if let Some(filter) = ctx.chat.property(props::DATA_FILTER) {
            instruction = instruction.replace(FILTER_PLACEHOLDER, filter);
        }

        ctx.agent.current_behaviour = role.clone();
        notify(ctx, step, true);
        match ctx.chat.messages.iter_mut().find(|m| m.role == Role::System) {
            Some(system) => system.content = instruction.clone(),
            None => ctx.chat.messages.insert(0, Message::system(instruction.clone())),
        }
        ctx.chat
            .push(Message::system(format!("Now - {}", instruction)).internal());

        if *once {
            ctx.chat.properties.insert(props::BECOME_ONCE.to_string(), "true".into());
        }
        tracing::info!("[Step] {} became '{}'", ctx.agent.name, role);
        Ok(StepOutcome::none())
    }
}

/// Resets behaviour, chat properties and messages to the seeded instruction.
pub struct CleanupStepHandler;

#[async_trait]
impl StepHandler for CleanupStepHandler {
    async fn handle(&self, step: &Step, ctx: &mut StepContext<'_>) -> Result<StepOutcome, FlowError> {
        if !matches!(step.kind(), StepKind::Cleanup) {
            return Err(unexpected(step));
        }
        ctx.agent.current_behaviour = DEFAULT_BEHAVIOUR.to_string();
        ctx.chat.reset_to_instruction(&ctx.agent.context.instruction);
        Ok(StepOutcome::none())
    }
}

pub struct McpStepHandler;

#[async_trait]
impl StepHandler for McpStepHandler {
    async fn handle(&self, step: &Step, ctx: &mut StepContext<'_>) -> Result<StepOutcome, FlowError> {
        if !matches!(step.kind(), StepKind::Mcp) {
            return Err(unexpected(step));
        }
        let config = ctx.agent.context.mcp_config.clone().ok_or_else(|| {
            FlowError::Configuration(format!("agent '{}' has no MCP configuration", ctx.agent.name))
        })?;
        ctx.chat.ensure_user_message_last();
        notify(ctx, step, true);

        let reply = ctx
            .run
            .engine()
            .commands
            .call(
                Command::Mcp {
                    chat: &*ctx.chat,
                    config: &config,
                },
                ctx.run,
            )
            .await?
            .ok_or_else(|| no_reply(step))?;

        fold_reply(ctx.chat, &reply);
        Ok(StepOutcome::with(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_marker_is_extracted() {
        assert_eq!(extract_filter("ok filter:{42} done"), Some("42".into()));
        assert_eq!(extract_filter("filter::{a b}"), Some("a b".into()));
        assert_eq!(extract_filter("no marker"), None);
    }
}
