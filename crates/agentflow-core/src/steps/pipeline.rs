use chrono::Utc;

use super::{StepContext, StepKind};
use crate::error::FlowError;
use crate::models::{Agent, Chat, Message};
use crate::service::RunContext;

/// Run every step of `agent` against `chat`, in order.
///
/// The chat and the agent record (behaviour, started flag) are saved after
/// each completed step, so a failure leaves the state of the last successful
/// step behind.
pub async fn run_pipeline(agent: &mut Agent, chat: &mut Chat, run: &RunContext) -> Result<(), FlowError> {
    let engine = run.engine();
    let steps = agent.parsed_steps()?;
    let mut redirect_message: Option<Message> = chat.last_message().cloned();

    for step in &steps {
        if run.cancel_token().is_cancelled() {
            tracing::warn!("[Pipeline] {} cancelled before '{}'", agent.name, step);
            return Err(FlowError::Cancelled(step.to_string()));
        }

        let handler = engine.steps.get(step.key())?;
        tracing::info!("[Pipeline] {} ▶ {}", agent.name, step);

        let outcome = {
            let mut ctx = StepContext {
                agent: &mut *agent,
                chat: &mut *chat,
                redirect_message: redirect_message.as_ref(),
                run,
            };
            handler.handle(step, &mut ctx).await?
        };

        if !matches!(step.kind(), StepKind::Redirect { .. }) {
            if let Some(message) = outcome.message {
                redirect_message = Some(message);
            }
        }

        chat.updated_at = Utc::now();
        engine.chats.save(&agent.id, chat).await?;
        if step_touches_agent(step.kind()) {
            agent.touch();
            engine.agents.save(agent).await?;
        }
    }
    Ok(())
}

fn step_touches_agent(kind: &StepKind) -> bool {
    matches!(
        kind,
        StepKind::Start | StepKind::Become { .. } | StepKind::Cleanup
    )
}
