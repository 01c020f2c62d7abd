use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::Agent;

/// A named group of agents. The agent with the lowest `order` is the entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFlow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub agents: Vec<Agent>,
    pub created_at: DateTime<Utc>,
}

impl AgentFlow {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            agents: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn entry_agent(&self) -> Option<&Agent> {
        self.agents.iter().min_by_key(|a| a.order)
    }

    pub fn sort_agents(&mut self) {
        self.agents.sort_by_key(|a| a.order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_agent_is_lowest_order() {
        let mut flow = AgentFlow::new("f", "");
        for (name, order) in [("second", 2), ("first", 0), ("middle", 1)] {
            flow.agents.push(
                Agent::builder()
                    .with_name(name)
                    .with_model("m")
                    .with_order(order)
                    .build()
                    .unwrap(),
            );
        }
        assert_eq!(flow.entry_agent().unwrap().name, "first");
        flow.sort_agents();
        assert_eq!(flow.agents[2].name, "second");
    }
}
