//! Flow assembly: grouping agents, running the entry agent and moving whole
//! flows in and out of zip bundles.

pub mod archive;
pub mod definition;

pub use definition::{AgentDefinition, FlowDefinition};

use std::collections::HashSet;
use std::path::Path;

use crate::error::FlowError;
use crate::models::{Agent, AgentFlow, ChatResult, DEFAULT_BEHAVIOUR};
use crate::service::AgentService;
use crate::store::FlowStore;

#[derive(Clone)]
pub struct FlowService {
    agents: AgentService,
    flows: FlowStore,
}

impl FlowService {
    pub fn new(agents: AgentService, flows: FlowStore) -> Self {
        Self { agents, flows }
    }

    /// Persist the flow header and create each member agent with its chat.
    /// Nothing is left behind when any member cannot be created.
    pub async fn create_flow(&self, mut flow: AgentFlow) -> Result<AgentFlow, FlowError> {
        if flow.agents.is_empty() {
            return Err(FlowError::Configuration(format!(
                "flow '{}' has no agents",
                flow.name
            )));
        }
        flow.sort_agents();
        self.check_members(&flow).await?;
        warn_unknown_relations(&flow);

        self.flows.save(&flow).await?;
        let mut created = Vec::with_capacity(flow.agents.len());
        for mut agent in std::mem::take(&mut flow.agents) {
            agent.flow = true;
            if let Err(e) = self.add_member(agent, &flow.id, &mut created).await {
                self.roll_back(&flow, &created).await;
                return Err(e);
            }
        }
        flow.agents = created;

        tracing::info!(
            "[FlowService] Created flow '{}' ({}) with {} agents",
            flow.name,
            flow.id,
            flow.agents.len()
        );
        Ok(flow)
    }

    /// Reject duplicate or already stored agent ids and bad steps up front.
    async fn check_members(&self, flow: &AgentFlow) -> Result<(), FlowError> {
        let mut seen = HashSet::new();
        for agent in &flow.agents {
            if !seen.insert(agent.id.as_str()) {
                return Err(FlowError::Configuration(format!(
                    "agent '{}' appears twice in flow '{}'",
                    agent.id, flow.name
                )));
            }
            if self.agents.agent_exists(&agent.id).await? {
                return Err(FlowError::Configuration(format!(
                    "agent '{}' already exists",
                    agent.id
                )));
            }
            agent.parsed_steps()?;
        }
        Ok(())
    }

    async fn add_member(
        &self,
        agent: Agent,
        flow_id: &str,
        created: &mut Vec<Agent>,
    ) -> Result<(), FlowError> {
        let agent = self.agents.create_agent(agent).await?;
        let id = agent.id.clone();
        created.push(agent);
        self.agents.engine().agents.assign_flow(&id, flow_id).await
    }

    async fn roll_back(&self, flow: &AgentFlow, created: &[Agent]) {
        tracing::warn!(
            "[FlowService] Rolling back flow '{}' ({}), {} agent(s) created",
            flow.name,
            flow.id,
            created.len()
        );
        for agent in created {
            if let Err(e) = self.agents.delete_agent(&agent.id).await {
                tracing::error!("[FlowService] Failed to remove agent {}: {}", agent.id, e);
            }
        }
        if let Err(e) = self.flows.delete(&flow.id).await {
            tracing::error!("[FlowService] Failed to remove flow {}: {}", flow.id, e);
        }
    }

    pub async fn get_flow(&self, flow_id: &str) -> Result<AgentFlow, FlowError> {
        let mut flow = self
            .flows
            .get(flow_id)
            .await?
            .ok_or_else(|| FlowError::NotFound(format!("flow '{}'", flow_id)))?;
        flow.agents = self.agents.engine().agents.list_by_flow(flow_id).await?;
        Ok(flow)
    }

    /// Flow headers, newest first. Agents are not loaded.
    pub async fn flows(&self) -> Result<Vec<AgentFlow>, FlowError> {
        self.flows.list().await
    }

    pub async fn delete_flow(&self, flow_id: &str) -> Result<(), FlowError> {
        let flow = self.get_flow(flow_id).await?;
        for agent in &flow.agents {
            self.agents.delete_agent(&agent.id).await?;
        }
        self.flows.delete(flow_id).await?;
        tracing::info!("[FlowService] Deleted flow '{}' ({})", flow.name, flow_id);
        Ok(())
    }

    /// Send `text` to the flow's entry agent. Other members only run when a
    /// REDIRECT step reaches them.
    pub async fn process(&self, flow_id: &str, text: &str) -> Result<ChatResult, FlowError> {
        let flow = self.get_flow(flow_id).await?;
        let entry = flow.entry_agent().ok_or_else(|| {
            FlowError::Configuration(format!("flow '{}' has no agents", flow.name))
        })?;
        tracing::info!("[FlowService] '{}' entering at '{}'", flow.name, entry.name);
        self.agents.process(&entry.id, text).await
    }

    pub async fn save_archive(&self, flow_id: &str, path: &Path) -> Result<(), FlowError> {
        let flow = self.get_flow(flow_id).await?;
        archive::save(&flow, path)
    }

    /// Restore a bundle as a new flow. Agent ids are kept so redirects still
    /// resolve; conversation state starts fresh.
    pub async fn load_archive(&self, path: &Path) -> Result<AgentFlow, FlowError> {
        let mut flow = archive::load(path)?;
        for agent in &mut flow.agents {
            reset_runtime_state(agent);
        }
        self.create_flow(flow).await
    }

    pub async fn import(&self, definition: FlowDefinition) -> Result<AgentFlow, FlowError> {
        self.create_flow(definition.into_flow()?).await
    }
}

fn reset_runtime_state(agent: &mut Agent) {
    agent.started = false;
    agent.chat_id.clear();
    agent.current_behaviour = DEFAULT_BEHAVIOUR.to_string();
}

fn warn_unknown_relations(flow: &AgentFlow) {
    for agent in &flow.agents {
        for relation in &agent.context.relations {
            if !flow.agents.iter().any(|a| &a.id == relation) {
                tracing::warn!(
                    "[FlowService] Agent '{}' relates to '{}', which is not in flow '{}'",
                    agent.name,
                    relation,
                    flow.name
                );
            }
        }
    }
}

/// Assembles an [`AgentFlow`] in code.
#[derive(Default)]
pub struct FlowBuilder {
    id: Option<String>,
    name: String,
    description: String,
    agents: Vec<Agent>,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn add_agents(mut self, agents: impl IntoIterator<Item = Agent>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn build(self) -> Result<AgentFlow, FlowError> {
        if self.name.trim().is_empty() {
            return Err(FlowError::Configuration("flow name is required".into()));
        }
        let mut flow = AgentFlow::new(self.name, self.description);
        if let Some(id) = self.id {
            flow.id = id;
        }
        flow.agents = self.agents;
        flow.sort_agents();
        Ok(flow)
    }
}
