//! Engine configuration, loaded from YAML.
//!
//! ```yaml
//! data_dir: ~/.agentflow
//! max_redirect_depth: 16
//! redirect_lock_timeout_ms: 30000
//! http_timeout_secs: 120
//! backend:
//!   adapter: openai
//!   base_url: https://api.openai.com/v1
//!   api_key: ${OPENAI_API_KEY}
//! ```
//!
//! String values may reference environment variables with `${VAR}` or
//! `${VAR:-default}`; they are expanded before parsing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::FlowError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root for the database, knowledge indices and flow archives.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Overrides `{data_dir}` as the parent of the `Knowledge/` tree.
    #[serde(default)]
    pub knowledge_dir: Option<PathBuf>,

    /// Longest redirect chain a single request may build.
    #[serde(default = "default_max_redirect_depth")]
    pub max_redirect_depth: usize,

    /// How long a redirect waits for its target agent to become free.
    #[serde(default = "default_redirect_lock_timeout")]
    pub redirect_lock_timeout_ms: u64,

    /// Timeout applied to API/Web sources and the HTTP model backend.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    pub backend: BackendConfig,
}

/// Connection details for the bundled HTTP model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// `anthropic` (Messages API) or `openai` (chat completions).
    #[serde(default = "default_adapter")]
    pub adapter: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f64>,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".agentflow"))
        .unwrap_or_else(|| PathBuf::from(".agentflow"))
}

fn default_max_redirect_depth() -> usize {
    16
}

fn default_redirect_lock_timeout() -> u64 {
    30_000
}

fn default_http_timeout() -> u64 {
    300
}

fn default_adapter() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            adapter: default_adapter(),
            base_url: default_base_url(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            knowledge_dir: None,
            max_redirect_depth: default_max_redirect_depth(),
            redirect_lock_timeout_ms: default_redirect_lock_timeout(),
            http_timeout_secs: default_http_timeout(),
            backend: BackendConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, FlowError> {
        serde_yaml::from_str(&resolve_env_vars(yaml))
            .map_err(|e| FlowError::Configuration(format!("Failed to parse engine config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Configuration(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn knowledge_root(&self) -> PathBuf {
        self.knowledge_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.clone())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("agentflow.db")
    }
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}`; unset variables without a
/// default are left as written.
pub fn resolve_env_vars(input: &str) -> String {
    static RE: OnceLock<Option<regex::Regex>> = OnceLock::new();
    let Some(re) = RE.get_or_init(|| regex::Regex::new(r"\$\{([^}]+)\}").ok()) else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let expr = &caps[1];
        match expr.split_once(":-") {
            Some((name, fallback)) => std::env::var(name).unwrap_or_else(|_| fallback.to_string()),
            None => std::env::var(expr).unwrap_or_else(|_| format!("${{{}}}", expr)),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("AGENTFLOW_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${AGENTFLOW_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix-${AGENTFLOW_TEST_VAR}-suffix"),
            "prefix-hello-suffix"
        );
        assert_eq!(resolve_env_vars("${AGENTFLOW_NOPE:-fallback}"), "fallback");
        assert_eq!(resolve_env_vars("${AGENTFLOW_NOPE}"), "${AGENTFLOW_NOPE}");
        std::env::remove_var("AGENTFLOW_TEST_VAR");
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let config = EngineConfig::from_yaml("max_redirect_depth: 3\n").unwrap();
        assert_eq!(config.max_redirect_depth, 3);
        assert_eq!(config.http_timeout_secs, 300);
        assert_eq!(config.redirect_lock_timeout_ms, 30_000);
        assert_eq!(config.backend.adapter, "openai");
    }

    #[test]
    fn knowledge_root_falls_back_to_data_dir() {
        let config = EngineConfig::from_yaml("data_dir: /tmp/af\n").unwrap();
        assert_eq!(config.knowledge_root(), PathBuf::from("/tmp/af"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/af/agentflow.db"));
    }

    #[test]
    fn bad_yaml_is_configuration_error() {
        let err = EngineConfig::from_yaml("max_redirect_depth: [").unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));
    }
}
