//! YAML flow definitions.
//!
//! ```yaml
//! name: "Support Desk"
//! description: "Triage questions and hand billing to a specialist"
//!
//! agents:
//!   - id: triage
//!     name: Triage
//!     model: gpt-4o-mini
//!     order: 0
//!     instruction: "Route the customer's question."
//!     steps: [START, ANSWER, "REDIRECT+billing+AS_Output+REPLACE"]
//!     relations: [billing]
//!
//!   - id: billing
//!     name: Billing
//!     model: gpt-4o-mini
//!     backend: OpenAi
//!     order: 1
//!     instruction: "Answer billing questions."
//!     steps: [FETCH_DATA, ANSWER]
//!     source:
//!       type: Api
//!       url: "https://billing.internal/invoices"
//!       query: "?customer=@filter@"
//!       authenticationType: Bearer
//!       authenticationToken: "${BILLING_TOKEN}"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::config::resolve_env_vars;
use crate::error::FlowError;
use crate::models::{Agent, AgentFlow, AgentSource, BackendType, McpConfig, ToolsConfiguration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub agents: Vec<AgentDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Stable id other agents redirect to. Generated when omitted.
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,

    pub model: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub backend: BackendType,

    #[serde(default)]
    pub order: u32,

    #[serde(default)]
    pub instruction: Option<String>,

    #[serde(default = "default_steps")]
    pub steps: Vec<String>,

    #[serde(default)]
    pub relations: Vec<String>,

    #[serde(default)]
    pub source: Option<AgentSource>,

    #[serde(default)]
    pub behaviours: HashMap<String, String>,

    #[serde(default)]
    pub mcp: Option<McpConfig>,

    #[serde(default)]
    pub tools: Option<ToolsConfiguration>,

    #[serde(default)]
    pub visual: bool,
}

fn default_steps() -> Vec<String> {
    vec!["ANSWER".to_string()]
}

impl FlowDefinition {
    /// Parse a definition; `${VAR}` references are expanded first.
    pub fn from_yaml(yaml: &str) -> Result<Self, FlowError> {
        serde_yaml::from_str(&resolve_env_vars(yaml))
            .map_err(|e| FlowError::Configuration(format!("Failed to parse flow YAML: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Configuration(format!("Failed to read flow file '{}': {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Build validated agents. Fails on the first agent with a bad step list.
    pub fn into_flow(self) -> Result<AgentFlow, FlowError> {
        let mut flow = AgentFlow::new(self.name, self.description);
        for def in self.agents {
            flow.agents.push(def.into_agent()?);
        }
        flow.sort_agents();
        Ok(flow)
    }
}

impl AgentDefinition {
    pub fn into_agent(self) -> Result<Agent, FlowError> {
        let mut builder = Agent::builder()
            .with_name(self.name)
            .with_model(self.model)
            .with_description(self.description)
            .with_backend(self.backend)
            .with_order(self.order)
            .with_steps(self.steps)
            .with_relations(self.relations)
            .visual(self.visual);
        if let Some(id) = self.id {
            builder = builder.with_id(id);
        }
        if let Some(instruction) = self.instruction {
            builder = builder.with_instruction(instruction);
        }
        if let Some(source) = self.source {
            builder = builder.with_source(source);
        }
        if let Some(mcp) = self.mcp {
            builder = builder.with_mcp_config(mcp);
        }
        if let Some(tools) = self.tools {
            builder = builder.with_tools(tools);
        }
        for (name, instruction) in self.behaviours {
            builder = builder.with_behaviour(name, instruction);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_flow() {
        let yaml = r#"
name: "Echo"
agents:
  - name: "Echo"
    model: "llama3"
"#;
        let def = FlowDefinition::from_yaml(yaml).unwrap();
        let flow = def.into_flow().unwrap();
        assert_eq!(flow.name, "Echo");
        assert_eq!(flow.agents[0].context.steps, vec!["ANSWER"]);
    }

    #[test]
    fn test_parse_full_flow() {
        std::env::set_var("AGENTFLOW_DEF_TOKEN", "s3cret");
        let yaml = r#"
name: "Desk"
description: "two agents"
agents:
  - id: billing
    name: Billing
    model: m
    order: 1
    backend: OpenAi
    steps: [FETCH_DATA, ANSWER]
    source:
      type: Api
      url: "https://billing/invoices"
      authenticationType: Bearer
      authenticationToken: "${AGENTFLOW_DEF_TOKEN}"
  - id: triage
    name: Triage
    model: m
    order: 0
    instruction: "Route it"
    steps: [START, "BECOME+Strict", ANSWER, "REDIRECT+billing+AS_Output+REPLACE"]
    relations: [billing]
    behaviours:
      Strict: "Only answer about @filter@"
"#;
        let flow = FlowDefinition::from_yaml(yaml).unwrap().into_flow().unwrap();
        std::env::remove_var("AGENTFLOW_DEF_TOKEN");

        assert_eq!(flow.entry_agent().unwrap().id, "triage");
        assert_eq!(flow.agents[0].id, "triage");
        let billing = &flow.agents[1];
        assert_eq!(billing.backend, BackendType::OpenAi);
        match billing.context.source.as_ref().unwrap() {
            AgentSource::Api(api) => {
                assert_eq!(api.authentication_token.as_deref(), Some("s3cret"))
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert_eq!(flow.agents[0].behaviours["Strict"], "Only answer about @filter@");
    }

    #[test]
    fn bad_step_fails_the_definition() {
        let yaml = r#"
name: "Broken"
agents:
  - name: A
    model: m
    steps: ["ANSWER+LOUDLY"]
"#;
        let err = FlowDefinition::from_yaml(yaml).unwrap().into_flow().unwrap_err();
        assert!(matches!(err, FlowError::InvalidStep { .. }));
    }
}
