use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::agent::BackendType;

/// Transport used to reach a protocol-bridge (MCP) server.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum McpTransport {
    #[default]
    Stdio,
    Http,
}

impl std::fmt::Display for McpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            McpTransport::Stdio => write!(f, "stdio"),
            McpTransport::Http => write!(f, "http"),
        }
    }
}

/// Protocol-bridge configuration attached to an agent for the `MCP` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    pub name: String,
    #[serde(default)]
    pub transport: McpTransport,
    /// Executable for stdio servers, URL for http servers.
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Model that drives tool selection on the bridge side.
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendType>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,
}
