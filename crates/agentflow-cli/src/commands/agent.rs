//! `agentflow agent`: inspect and talk to individual agents.

use agentflow_core::state::AppState;

use super::{print_json, truncate};

pub async fn list(state: &AppState) -> Result<(), String> {
    let agents = state.agent_service.agents().await.map_err(|e| e.to_string())?;
    if agents.is_empty() {
        println!("No agents yet.");
        return Ok(());
    }

    println!("┌──────────────────────────────────────┬──────────────────┬───────┬──────────┬──────────────────────────────┐");
    println!("│ ID                                   │ Name             │ Order │ Backend  │ Steps                        │");
    println!("├──────────────────────────────────────┼──────────────────┼───────┼──────────┼──────────────────────────────┤");
    for agent in &agents {
        println!(
            "│ {:<36} │ {:<16} │ {:>5} │ {:<8} │ {:<28} │",
            truncate(&agent.id, 36),
            truncate(&agent.name, 16),
            agent.order,
            agent.backend.as_str(),
            truncate(&agent.context.steps.join(" "), 28)
        );
    }
    println!("└──────────────────────────────────────┴──────────────────┴───────┴──────────┴──────────────────────────────┘");
    Ok(())
}

/// Print the agent's chat as JSON.
pub async fn chat(state: &AppState, agent_id: &str) -> Result<(), String> {
    let chat = state
        .agent_service
        .get_chat(agent_id)
        .await
        .map_err(|e| e.to_string())?;
    let value = serde_json::to_value(&chat).map_err(|e| e.to_string())?;
    print_json(&value);
    Ok(())
}

pub async fn restart(state: &AppState, agent_id: &str) -> Result<(), String> {
    let chat = state
        .agent_service
        .restart(agent_id)
        .await
        .map_err(|e| e.to_string())?;
    println!(
        "🔄 Restarted agent {} ({} message(s) kept)",
        agent_id,
        chat.messages.len()
    );
    Ok(())
}

pub async fn send(state: &AppState, agent_id: &str, message: &str) -> Result<(), String> {
    let result = state
        .agent_service
        .process(agent_id, message)
        .await
        .map_err(|e| e.to_string())?;
    println!("{}", result.message.content);
    Ok(())
}

pub async fn delete(state: &AppState, agent_id: &str) -> Result<(), String> {
    if !state
        .agent_service
        .agent_exists(agent_id)
        .await
        .map_err(|e| e.to_string())?
    {
        return Err(format!("Agent '{}' not found", agent_id));
    }
    state
        .agent_service
        .delete_agent(agent_id)
        .await
        .map_err(|e| e.to_string())?;
    println!("🗑  Deleted agent {}", agent_id);
    Ok(())
}
