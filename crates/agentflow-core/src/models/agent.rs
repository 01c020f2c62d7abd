use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::mcp::McpConfig;
use super::source::AgentSource;
use crate::error::FlowError;
use crate::steps::Step;

pub const DEFAULT_BEHAVIOUR: &str = "Default";
pub const DEFAULT_INSTRUCTION: &str =
    "Hello, I'm your personal assistant. How can I assist you today?";

/// Model provider an agent talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendType {
    /// Whatever backend the engine was configured with.
    #[default]
    Local,
    OpenAi,
    Anthropic,
    Gemini,
    DeepSeek,
    GroqCloud,
    Ollama,
}

impl BackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "Local",
            Self::OpenAi => "OpenAi",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
            Self::DeepSeek => "DeepSeek",
            Self::GroqCloud => "GroqCloud",
            Self::Ollama => "Ollama",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "self" => Some(Self::Local),
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "gemini" => Some(Self::Gemini),
            "deepseek" => Some(Self::DeepSeek),
            "groqcloud" | "groq" => Some(Self::GroqCloud),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }
}

/// A function the model may call, forwarded to tool-capable backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfiguration {
    #[serde(default)]
    pub functions: Vec<FunctionDeclaration>,
}

/// The declarative part of an agent: what it knows and what it does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentData {
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<AgentSource>,
    pub steps: Vec<String>,
    /// Agents this one expects to redirect to. Checked when a flow is
    /// created, never enforced at run time.
    #[serde(default)]
    pub relations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_config: Option<McpConfig>,
}

impl Default for AgentData {
    fn default() -> Self {
        Self {
            instruction: DEFAULT_INSTRUCTION.to_string(),
            source: None,
            steps: vec!["ANSWER".to_string()],
            relations: Vec::new(),
            mcp_config: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub backend: BackendType,
    #[serde(default)]
    pub order: u32,
    /// Whether the `START` step already seeded this agent's chat.
    #[serde(default)]
    pub started: bool,
    /// Member of a flow.
    #[serde(default)]
    pub flow: bool,
    /// Chat is routed to the image backend instead of the text backend.
    #[serde(default)]
    pub visual: bool,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_behaviour")]
    pub current_behaviour: String,
    #[serde(default)]
    pub behaviours: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_configuration: Option<ToolsConfiguration>,
    pub context: AgentData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_behaviour() -> String {
    DEFAULT_BEHAVIOUR.to_string()
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    /// Parse the raw step list. Fails on the first unknown or malformed step.
    pub fn parsed_steps(&self) -> Result<Vec<Step>, FlowError> {
        self.context.steps.iter().map(|s| Step::parse(s)).collect()
    }

    pub fn has_start_step(&self) -> bool {
        self.context
            .steps
            .iter()
            .any(|s| s.split('+').next() == Some("START"))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Builds and validates an [`Agent`]. Steps are parsed at `build()` time so
/// a bad encoding never reaches the store.
#[derive(Debug, Clone, Default)]
pub struct AgentBuilder {
    id: Option<String>,
    name: Option<String>,
    model: Option<String>,
    description: String,
    backend: BackendType,
    order: u32,
    visual: bool,
    behaviours: HashMap<String, String>,
    tools: Option<ToolsConfiguration>,
    data: AgentData,
}

impl AgentBuilder {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.data.instruction = instruction.into();
        self
    }

    pub fn with_source(mut self, source: AgentSource) -> Self {
        self.data.source = Some(source);
        self
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relations<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data.relations = relations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_behaviour(mut self, name: impl Into<String>, instruction: impl Into<String>) -> Self {
        self.behaviours.insert(name.into(), instruction.into());
        self
    }

    pub fn with_mcp_config(mut self, config: McpConfig) -> Self {
        self.data.mcp_config = Some(config);
        self
    }

    pub fn with_tools(mut self, tools: ToolsConfiguration) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn visual(mut self, visual: bool) -> Self {
        self.visual = visual;
        self
    }

    pub fn build(self) -> Result<Agent, FlowError> {
        let name = self
            .name
            .ok_or_else(|| FlowError::Configuration("agent name is required".into()))?;
        let model = self
            .model
            .ok_or_else(|| FlowError::Configuration(format!("agent '{}' has no model", name)))?;
        if self.data.steps.is_empty() {
            return Err(FlowError::Configuration(format!(
                "agent '{}' has an empty step list",
                name
            )));
        }
        for step in &self.data.steps {
            Step::parse(step)?;
        }

        let now = Utc::now();
        Ok(Agent {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name,
            model,
            description: self.description,
            backend: self.backend,
            order: self.order,
            started: false,
            flow: false,
            visual: self.visual,
            chat_id: String::new(),
            current_behaviour: default_behaviour(),
            behaviours: self.behaviours,
            tools_configuration: self.tools,
            context: self.data,
            created_at: now,
            updated_at: now,
        })
    }
}
