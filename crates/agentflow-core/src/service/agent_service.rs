use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use super::{Engine, RunContext};
use crate::commands::Command;
use crate::error::FlowError;
use crate::models::{props, Agent, BackendType, Chat, ChatResult, Message, Role};
use crate::steps::run_pipeline;

struct Inner {
    engine: Arc<Engine>,
    // ─── one async mutex per agent chat ───
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Agent lifecycle and message processing.
#[derive(Clone)]
pub struct AgentService {
    inner: Arc<Inner>,
}

impl AgentService {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    async fn lock_handle(&self, agent_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn lock(&self, agent_id: &str) -> OwnedMutexGuard<()> {
        self.lock_handle(agent_id).await.lock_owned().await
    }

    async fn forget_lock(&self, agent_id: &str) {
        self.inner.locks.lock().await.remove(agent_id);
    }

    async fn ensure_exists(&self, agent_id: &str) -> Result<(), FlowError> {
        if self.agent_exists(agent_id).await? {
            Ok(())
        } else {
            Err(FlowError::NotFound(format!("agent '{}'", agent_id)))
        }
    }

    // ─── Lifecycle ──────────────────────────────────────────────────────

    /// Persist a new agent together with a fresh chat. Agents whose pipeline
    /// has no `START` step get their instruction seeded right away.
    pub async fn create_agent(&self, mut agent: Agent) -> Result<Agent, FlowError> {
        if self.engine().agents.exists(&agent.id).await? {
            return Err(FlowError::Configuration(format!(
                "agent '{}' already exists",
                agent.id
            )));
        }
        agent.parsed_steps()?;

        let mut chat = Chat::new(agent.name.clone(), agent.model.clone());
        chat.visual = agent.visual;
        if agent.backend != BackendType::Local {
            chat.backend = Some(agent.backend);
        }

        if !agent.has_start_step() {
            let run = RunContext::root(self.clone(), &agent.id, CancellationToken::new());
            self.engine()
                .commands
                .call(
                    Command::Start {
                        chat: &mut chat,
                        instruction: &agent.context.instruction,
                    },
                    &run,
                )
                .await?;
            agent.started = true;
        }

        agent.chat_id = chat.id.clone();
        self.engine().agents.save(&agent).await?;
        self.engine().chats.save(&agent.id, &chat).await?;
        tracing::info!("[AgentService] Created agent '{}' ({})", agent.name, agent.id);
        Ok(agent)
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Agent, FlowError> {
        self.engine()
            .agents
            .get(agent_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("agent '{}'", agent_id)))
    }

    pub async fn agents(&self) -> Result<Vec<Agent>, FlowError> {
        self.engine().agents.list().await
    }

    pub async fn agent_exists(&self, agent_id: &str) -> Result<bool, FlowError> {
        self.engine().agents.exists(agent_id).await
    }

    pub async fn get_chat(&self, agent_id: &str) -> Result<Chat, FlowError> {
        self.engine()
            .chats
            .get_by_agent(agent_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("chat for agent '{}'", agent_id)))
    }

    /// Drop the conversation back to its seeded instruction and forget
    /// run-once markers and filters.
    pub async fn restart(&self, agent_id: &str) -> Result<Chat, FlowError> {
        self.ensure_exists(agent_id).await?;
        let _guard = self.lock(agent_id).await;
        let mut chat = self.get_chat(agent_id).await?;
        match chat.messages.first() {
            Some(first) if first.role == Role::System => chat.messages.truncate(1),
            _ => chat.messages.clear(),
        }
        chat.properties.clear();
        self.engine().chats.save(agent_id, &chat).await?;
        tracing::info!("[AgentService] Restarted chat of agent {}", agent_id);
        Ok(chat)
    }

    pub async fn delete_agent(&self, agent_id: &str) -> Result<(), FlowError> {
        {
            let _guard = self.lock(agent_id).await;
            self.engine().chats.delete_by_agent(agent_id).await?;
            self.engine().agents.delete(agent_id).await?;
        }
        self.forget_lock(agent_id).await;
        tracing::info!("[AgentService] Deleted agent {}", agent_id);
        Ok(())
    }

    // ─── Processing ─────────────────────────────────────────────────────

    /// Append `text` as a User message and run the agent's pipeline.
    pub async fn process(&self, agent_id: &str, text: &str) -> Result<ChatResult, FlowError> {
        self.process_message(agent_id, Message::user(text), CancellationToken::new())
            .await
    }

    pub async fn process_message(
        &self,
        agent_id: &str,
        message: Message,
        cancel: CancellationToken,
    ) -> Result<ChatResult, FlowError> {
        self.ensure_exists(agent_id).await?;
        let _guard = self.lock(agent_id).await;
        let mut agent = match self.get_agent(agent_id).await {
            Ok(agent) => agent,
            Err(e) => {
                self.forget_lock(agent_id).await;
                return Err(e);
            }
        };
        let mut chat = self.get_chat(agent_id).await?;

        chat.push(message);
        self.engine().chats.save(agent_id, &chat).await?;

        let run = RunContext::root(self.clone(), agent_id, cancel);
        run_pipeline(&mut agent, &mut chat, &run).await?;

        let last = chat
            .last_message()
            .cloned()
            .ok_or_else(|| FlowError::Data(format!("agent '{}' produced no messages", agent.name)))?;
        Ok(ChatResult::new(last, chat.model.clone()))
    }

    /// Run `target`'s pipeline on `message` as part of an ongoing request and
    /// return its final message, tagged internal with the System role.
    pub async fn run_redirect(
        &self,
        target: &str,
        message: &Message,
        filter: Option<&str>,
        parent: &RunContext,
    ) -> Result<Message, FlowError> {
        if parent.call_path().iter().any(|id| id == target) {
            let mut path = parent.call_path().to_vec();
            path.push(target.to_string());
            tracing::warn!("[AgentService] Redirect cycle: {}", path.join(" -> "));
            return Err(FlowError::RedirectCycle(path));
        }
        let max_depth = self.engine().max_redirect_depth;
        if parent.call_path().len() > max_depth {
            return Err(FlowError::RedirectDepthExceeded(max_depth));
        }

        if !self.agent_exists(target).await? {
            return Err(FlowError::NotFound(format!("redirect target agent '{}'", target)));
        }

        // Bounded: the caller still holds its own lock.
        let wait = self.engine().redirect_lock_timeout;
        let lock = self.lock_handle(target).await;
        let _guard = tokio::time::timeout(wait, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(
                    "[AgentService] Agent '{}' still busy after {:?} ({})",
                    target,
                    wait,
                    parent.call_path().join(" -> ")
                );
                FlowError::AgentBusy {
                    agent: target.to_string(),
                    waited_ms: wait.as_millis() as u64,
                }
            })?;

        let Some(mut agent) = self.engine().agents.get(target).await? else {
            self.forget_lock(target).await;
            return Err(FlowError::NotFound(format!("redirect target agent '{}'", target)));
        };
        let mut chat = self.get_chat(target).await?;

        chat.push(Message::user(message.content.clone()).internal());
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            chat.set_property_if_absent(props::DATA_FILTER, filter);
        }
        self.engine().chats.save(target, &chat).await?;

        tracing::info!(
            "[AgentService] Redirecting to '{}' ({})",
            agent.name,
            parent.call_path().join(" -> ")
        );
        let run = parent.child(target);
        run_pipeline(&mut agent, &mut chat, &run).await?;

        let last = chat
            .last_message()
            .ok_or_else(|| FlowError::Data(format!("agent '{}' produced no messages", agent.name)))?;
        let mut reply = Message::system(last.content.clone()).internal();
        reply.image = last.image.clone();
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::steps::StepBuilder;

    #[tokio::test]
    async fn unknown_ids_leave_no_lock_behind() {
        let db = Database::open_in_memory().unwrap();
        let service = AgentService::new(Engine::builder(db).build());
        let lonely = Agent::builder()
            .with_id("lonely")
            .with_name("lonely")
            .with_model("m")
            .with_steps(StepBuilder::new().redirect("nobody", "AS_Output", "").build())
            .build()
            .unwrap();
        service.create_agent(lonely).await.unwrap();

        let err = service.process("lonely", "hi").await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));
        let err = service.process("ghost", "hi").await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound(_)));
        assert!(service.restart("ghost").await.is_err());

        let locks = service.inner.locks.lock().await;
        assert!(!locks.contains_key("nobody"));
        assert!(!locks.contains_key("ghost"));
        assert!(locks.contains_key("lonely"));
    }
}
