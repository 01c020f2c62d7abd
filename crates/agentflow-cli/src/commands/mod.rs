//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and drives the
//! agentflow-core services through `AppState`.

pub mod agent;
pub mod flow;

use agentflow_core::state::{AppState, AppStateInner};
use agentflow_core::{Database, EngineConfig};
use std::path::PathBuf;
use std::sync::Arc;

/// Global options that decide where state lives.
#[derive(Debug, Default, Clone)]
pub struct StateOptions {
    pub db: Option<String>,
    pub config: Option<String>,
    pub data_dir: Option<String>,
}

/// Resolve the engine configuration: the YAML file if given, then the
/// `--data-dir` override.
pub fn load_config(options: &StateOptions) -> Result<EngineConfig, String> {
    let mut config = match &options.config {
        Some(path) => EngineConfig::from_file(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = &options.data_dir {
        config.data_dir = PathBuf::from(dir);
    }
    Ok(config)
}

/// Open the database and wire the engine.
pub fn init_state(options: &StateOptions) -> Result<AppState, String> {
    let config = load_config(options)?;
    let db_path = match &options.db {
        Some(path) => path.clone(),
        None => {
            std::fs::create_dir_all(&config.data_dir).map_err(|e| {
                format!(
                    "Failed to create data directory '{}': {}",
                    config.data_dir.display(),
                    e
                )
            })?;
            config.db_path().to_string_lossy().to_string()
        }
    };

    let db = Database::open(&db_path)
        .map_err(|e| format!("Failed to open database '{}': {}", db_path, e))?;
    tracing::debug!("Using database {}", db_path);
    Ok(Arc::new(AppStateInner::new(db, config)))
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
