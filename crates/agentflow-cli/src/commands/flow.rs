//! `agentflow flow`: define, run and package flows.

use std::path::Path;

use agentflow_core::models::{AgentFlow, ChatResult};
use agentflow_core::state::AppState;
use agentflow_core::FlowDefinition;
use serde::Serialize;

use super::{print_json, truncate};

/// Machine-readable summary printed after create/load.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub flow_id: String,
    pub name: String,
    pub description: String,
    pub entry_agent: Option<String>,
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    pub order: u32,
    pub steps: Vec<String>,
}

impl From<&AgentFlow> for FlowSummary {
    fn from(flow: &AgentFlow) -> Self {
        Self {
            flow_id: flow.id.clone(),
            name: flow.name.clone(),
            description: flow.description.clone(),
            entry_agent: flow.entry_agent().map(|a| a.id.clone()),
            agents: flow
                .agents
                .iter()
                .map(|a| AgentSummary {
                    id: a.id.clone(),
                    name: a.name.clone(),
                    order: a.order,
                    steps: a.context.steps.clone(),
                })
                .collect(),
        }
    }
}

fn print_summary(flow: &AgentFlow) -> Result<(), String> {
    let value = serde_json::to_value(FlowSummary::from(flow)).map_err(|e| e.to_string())?;
    print_json(&value);
    Ok(())
}

fn print_answer(result: &ChatResult) {
    println!("{}", result.message.content);
    if let Some(image) = &result.message.image {
        println!("[image: {} bytes]", image.len());
    }
}

/// Parse and validate a flow YAML file without storing it.
pub fn validate(file: &str) -> Result<(), String> {
    let definition = FlowDefinition::from_file(file).map_err(|e| e.to_string())?;
    let flow = definition.into_flow().map_err(|e| e.to_string())?;

    println!("✅ Flow '{}' is valid", flow.name);
    if !flow.description.is_empty() {
        println!("   {}", flow.description);
    }
    println!("   Agents: {}", flow.agents.len());
    for agent in &flow.agents {
        println!(
            "   {}. {} ({}) steps: {}",
            agent.order,
            agent.name,
            agent.id,
            agent.context.steps.join(", ")
        );
        for relation in &agent.context.relations {
            if !flow.agents.iter().any(|a| &a.id == relation) {
                println!("      ⚠ relation '{}' is not part of this flow", relation);
            }
        }
    }
    Ok(())
}

/// Create a flow from a YAML file and return its id.
pub async fn create(state: &AppState, file: &str) -> Result<String, String> {
    let definition = FlowDefinition::from_file(file).map_err(|e| e.to_string())?;
    let flow = state
        .flow_service
        .import(definition)
        .await
        .map_err(|e| e.to_string())?;
    print_summary(&flow)?;
    Ok(flow.id)
}

/// Run an existing flow, or create one from `file` first.
pub async fn run(
    state: &AppState,
    file: Option<&str>,
    flow_id: Option<&str>,
    message: &str,
) -> Result<(), String> {
    let flow_id = match (file, flow_id) {
        (_, Some(id)) => id.to_string(),
        (Some(file), None) => {
            let definition = FlowDefinition::from_file(file).map_err(|e| e.to_string())?;
            let flow = state
                .flow_service
                .import(definition)
                .await
                .map_err(|e| e.to_string())?;
            tracing::info!("Created flow '{}' ({})", flow.name, flow.id);
            flow.id
        }
        (None, None) => return Err("either a flow file or --id is required".to_string()),
    };

    let result = state
        .flow_service
        .process(&flow_id, message)
        .await
        .map_err(|e| e.to_string())?;
    print_answer(&result);
    Ok(())
}

pub async fn save(state: &AppState, flow_id: &str, out: &str) -> Result<(), String> {
    state
        .flow_service
        .save_archive(flow_id, Path::new(out))
        .await
        .map_err(|e| e.to_string())?;
    println!("📦 Saved flow {} to {}", flow_id, out);
    Ok(())
}

pub async fn load(state: &AppState, archive: &str) -> Result<(), String> {
    let flow = state
        .flow_service
        .load_archive(Path::new(archive))
        .await
        .map_err(|e| e.to_string())?;
    print_summary(&flow)
}

pub async fn list(state: &AppState) -> Result<(), String> {
    let flows = state.flow_service.flows().await.map_err(|e| e.to_string())?;
    if flows.is_empty() {
        println!("No flows yet. Create one with `agentflow flow create <file>`.");
        return Ok(());
    }

    println!("┌──────────────────────────────────────┬──────────────────────┬──────────────────────────────┐");
    println!("│ ID                                   │ Name                 │ Description                  │");
    println!("├──────────────────────────────────────┼──────────────────────┼──────────────────────────────┤");
    for flow in &flows {
        println!(
            "│ {:<36} │ {:<20} │ {:<28} │",
            truncate(&flow.id, 36),
            truncate(&flow.name, 20),
            truncate(&flow.description, 28)
        );
    }
    println!("└──────────────────────────────────────┴──────────────────────┴──────────────────────────────┘");
    Ok(())
}

pub async fn delete(state: &AppState, flow_id: &str) -> Result<(), String> {
    state
        .flow_service
        .delete_flow(flow_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("🗑  Deleted flow {}", flow_id);
    Ok(())
}
